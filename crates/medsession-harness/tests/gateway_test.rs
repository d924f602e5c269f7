//! Gateway 401 recovery against a scripted transport and backend.

#![allow(clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use medsession_client::{
    ApiRequest, Gateway, GatewayError, SessionHandle, SessionRuntime, SystemEnv, TransportError,
};
use medsession_core::{
    CredentialStore, Endpoints, MemoryStorage, RefreshError, SessionConfig, StorageKeys,
};
use medsession_harness::{MockSessionApi, MockTransport};

type TestHandle = SessionHandle<SystemEnv, Arc<MockSessionApi>, Arc<MemoryStorage>>;
type TestRuntime = SessionRuntime<SystemEnv, Arc<MockSessionApi>, Arc<MemoryStorage>>;

struct Fixture {
    api: Arc<MockSessionApi>,
    transport: Arc<MockTransport>,
    runtime: TestRuntime,
    gateway: Gateway<Arc<MockTransport>, TestHandle>,
}

async fn fixture(logged_in: bool) -> Fixture {
    let api = Arc::new(MockSessionApi::new());
    let transport = Arc::new(MockTransport::new());
    let credentials =
        CredentialStore::load(Arc::new(MemoryStorage::new()), StorageKeys::default(), Vec::new());
    let runtime =
        SessionRuntime::new(SystemEnv::new(), Arc::clone(&api), credentials, SessionConfig::default())
            .unwrap();
    if logged_in {
        runtime.login("iyer@example.org", "pw").await.unwrap();
    }
    let gateway = Gateway::new(Arc::clone(&transport), runtime.handle(), Endpoints::default());

    Fixture { api, transport, runtime, gateway }
}

#[tokio::test(start_paused = true)]
async fn success_carries_current_bearer() {
    let f = fixture(true).await;

    let response = f.gateway.send(&ApiRequest::get("/patients")).await.unwrap();

    assert_eq!(response.status, 200);
    let seen = f.transport.requests();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].bearer.as_deref(), Some("tok-0"));
}

#[tokio::test(start_paused = true)]
async fn unauthorized_refreshes_and_retries_with_new_token() {
    let f = fixture(true).await;
    f.transport.respond(401, "");
    f.transport.respond(200, r#"{"patients":[]}"#);

    let response = f.gateway.send(&ApiRequest::get("/patients")).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(f.api.refresh_count(), 1);
    let bearers: Vec<_> = f.transport.requests().into_iter().map(|r| r.bearer).collect();
    assert_eq!(bearers, vec![Some("tok-0".to_string()), Some("tok-1".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn retry_is_attempted_only_once() {
    let f = fixture(true).await;
    f.transport.respond(401, "");
    f.transport.respond(401, "still no");

    let response = f.gateway.send(&ApiRequest::get("/patients")).await.unwrap();

    assert_eq!(response.status, 401);
    assert_eq!(response.body, b"still no");
    assert_eq!(f.transport.requests().len(), 2);
    assert_eq!(f.api.refresh_count(), 1);
    assert!(f.runtime.snapshot().is_authenticated);
}

#[tokio::test(start_paused = true)]
async fn credential_endpoint_is_never_retried() {
    let f = fixture(true).await;
    f.transport.respond(401, "");

    let result = f.gateway.send(&ApiRequest::post_empty("/session/refresh")).await;

    assert!(matches!(result, Err(GatewayError::Unauthorized { expired: false, .. })));
    assert_eq!(f.api.refresh_count(), 0);
    assert_eq!(f.transport.requests().len(), 1);
    let snapshot = f.runtime.snapshot();
    assert!(!snapshot.is_authenticated);
    assert!(!snapshot.is_expired);
}

#[tokio::test(start_paused = true)]
async fn expired_payload_freezes_session_without_refresh() {
    let f = fixture(true).await;
    f.transport.respond(401, r#"{"success":false,"code":"SESSION_EXPIRED"}"#);

    let result = f.gateway.send(&ApiRequest::get("/patients")).await;

    assert!(matches!(result, Err(GatewayError::Unauthorized { expired: true, .. })));
    assert_eq!(f.api.refresh_count(), 0);
    let snapshot = f.runtime.snapshot();
    assert!(snapshot.is_expired);
    assert!(snapshot.is_ui_frozen);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_returns_original_response() {
    let f = fixture(true).await;
    f.api.script_refresh(Err(RefreshError::Unknown { reason: "500".to_string() }));
    f.transport.respond(401, "original");

    let result = f.gateway.send(&ApiRequest::get("/patients")).await;

    let Err(GatewayError::Unauthorized { response, expired }) = result else {
        unreachable!("expected unauthorized, got {result:?}");
    };
    assert_eq!(response.body, b"original");
    assert!(!expired);
    assert_eq!(f.transport.requests().len(), 1);
    assert!(!f.runtime.snapshot().is_authenticated);
    assert_eq!(f.api.logout_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_refresh_freezes_session() {
    let f = fixture(true).await;
    f.api.script_refresh(Err(RefreshError::SessionExpired));
    f.transport.respond(401, "");

    let result = f.gateway.send(&ApiRequest::get("/patients")).await;

    assert!(matches!(result, Err(GatewayError::Unauthorized { expired: true, .. })));
    assert!(f.runtime.snapshot().is_expired);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_leaves_session_alone() {
    let f = fixture(true).await;
    f.transport.fail(TransportError::Timeout);

    let result = f.gateway.send(&ApiRequest::get("/patients")).await;

    assert!(matches!(result, Err(GatewayError::Transport(TransportError::Timeout))));
    assert!(f.runtime.snapshot().is_authenticated);
    assert_eq!(f.api.refresh_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn anonymous_request_has_no_bearer() {
    let f = fixture(false).await;
    f.transport.respond(401, "");

    let result = f.gateway.send(&ApiRequest::get("/patients")).await;

    assert!(matches!(result, Err(GatewayError::Unauthorized { expired: false, .. })));
    assert_eq!(f.transport.requests()[0].bearer, None);
    assert_eq!(f.api.refresh_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn requests_count_as_activity() {
    let f = fixture(true).await;
    f.runtime.start();

    f.gateway.send(&ApiRequest::get("/patients")).await.unwrap();
    assert_eq!(f.api.activity_count(), 1);

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        f.gateway.send(&ApiRequest::get("/patients")).await.unwrap();
    }

    assert!(!f.runtime.snapshot().is_expired);
    f.runtime.stop().await;
}
