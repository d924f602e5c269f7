//! Session runtime tests on a paused tokio clock.
//!
//! The runtime's loops sleep on the tokio clock, so with `start_paused` the
//! runtime auto-advances time whenever every task is idle. Fifteen minutes of
//! session life take microseconds.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use medsession_client::{ClientError, RefreshOutcome, SessionRuntime, SystemEnv};
use medsession_core::{
    ActivitySignal, CredentialStore, DurableStorage, MemoryStorage, RefreshError, RefreshOrigin,
    SessionConfig, StorageKeys,
};
use medsession_harness::{ApiCall, MockSessionApi, test_user};

type TestRuntime = SessionRuntime<SystemEnv, Arc<MockSessionApi>, Arc<MemoryStorage>>;

const HOUR: Duration = Duration::from_secs(3600);

fn runtime_with(
    api: &Arc<MockSessionApi>,
    storage: &Arc<MemoryStorage>,
    config: SessionConfig,
) -> TestRuntime {
    let credentials = CredentialStore::load(
        Arc::clone(storage),
        StorageKeys::default(),
        vec!["draft_visit_id".to_string()],
    );
    SessionRuntime::new(SystemEnv::new(), Arc::clone(api), credentials, config).unwrap()
}

fn runtime(api: &Arc<MockSessionApi>) -> (TestRuntime, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    (runtime_with(api, &storage, SessionConfig::default()), storage)
}

async fn wait_for_expiry(runtime: &TestRuntime, within: Duration) {
    let mut snapshots = runtime.subscribe();
    tokio::time::timeout(within, snapshots.wait_for(|s| s.is_expired))
        .await
        .expect("session did not expire in time")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn quiet_user_expires_after_idle_timeout() {
    let api = Arc::new(MockSessionApi::new());
    let (runtime, storage) = runtime(&api);
    runtime.start();
    runtime.login("iyer@example.org", "pw").await.unwrap();

    let started = tokio::time::Instant::now();
    wait_for_expiry(&runtime, Duration::from_secs(16 * 60)).await;

    assert!(started.elapsed() >= Duration::from_secs(15 * 60));
    let snapshot = runtime.snapshot();
    assert!(snapshot.is_ui_frozen);
    assert!(!snapshot.is_authenticated);
    assert_eq!(snapshot.user, None);
    assert_eq!(storage.get("access_token").unwrap(), None);
    assert_eq!(api.logout_count(), 0);

    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn activity_pushes_idle_deadline_back() {
    let api = Arc::new(MockSessionApi::new());
    let (runtime, _) = runtime(&api);
    runtime.start();
    runtime.login("iyer@example.org", "pw").await.unwrap();

    tokio::time::sleep(Duration::from_secs(10 * 60)).await;
    runtime.record_activity(ActivitySignal::Keyboard).await;
    tokio::time::sleep(Duration::from_secs(10 * 60)).await;

    assert!(!runtime.snapshot().is_expired);

    wait_for_expiry(&runtime, Duration::from_secs(6 * 60)).await;
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn loops_go_quiet_after_expiry() {
    let api = Arc::new(MockSessionApi::new());
    let (runtime, _) = runtime(&api);
    runtime.start();
    runtime.login("iyer@example.org", "pw").await.unwrap();

    wait_for_expiry(&runtime, Duration::from_secs(16 * 60)).await;
    let calls = api.calls().len();

    tokio::time::sleep(HOUR).await;

    assert_eq!(api.calls().len(), calls);
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn proactive_loop_notifies_before_refresh() {
    let api = Arc::new(MockSessionApi::new());
    let storage = Arc::new(MemoryStorage::new());
    let config = SessionConfig { probe_interval: HOUR, idle_detection: false, ..SessionConfig::default() };
    let runtime = runtime_with(&api, &storage, config);
    runtime.start();
    runtime.login("iyer@example.org", "pw").await.unwrap();

    tokio::time::sleep(Duration::from_secs(2 * 4 * 60 + 1)).await;

    assert_eq!(api.calls(), vec![
        ApiCall::Login { email: "iyer@example.org".to_string() },
        ApiCall::NotifyActivity { token: "tok-0".to_string() },
        ApiCall::Refresh { token: Some("tok-0".to_string()) },
        ApiCall::NotifyActivity { token: "tok-1".to_string() },
        ApiCall::Refresh { token: Some("tok-1".to_string()) },
    ]);
    assert_eq!(storage.get("access_token").unwrap().as_deref(), Some("tok-2"));

    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn idle_probe_runs_when_server_is_quiet() {
    let api = Arc::new(MockSessionApi::new());
    let storage = Arc::new(MemoryStorage::new());
    let config = SessionConfig { refresh_interval: HOUR, ..SessionConfig::default() };
    let runtime = runtime_with(&api, &storage, config);
    runtime.start();
    runtime.login("iyer@example.org", "pw").await.unwrap();

    // First tick at 12s is past the 8s threshold.
    tokio::time::sleep(Duration::from_secs(13)).await;
    assert_eq!(api.refresh_count(), 1);

    // Activity acknowledged just before the next tick skips it.
    tokio::time::sleep(Duration::from_secs(8)).await;
    runtime.record_activity(ActivitySignal::Pointer).await;
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(api.refresh_count(), 1);
    assert_eq!(api.activity_count(), 1);

    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn probe_rejection_expires_session() {
    let api = Arc::new(MockSessionApi::new());
    let (runtime, storage) = runtime(&api);
    storage.set("draft_visit_id", "visit-7").unwrap();
    runtime.start();
    runtime.login("iyer@example.org", "pw").await.unwrap();
    api.fail_refreshes(Some(RefreshError::SessionExpired));

    wait_for_expiry(&runtime, Duration::from_secs(30)).await;

    assert_eq!(storage.get("access_token").unwrap(), None);
    assert_eq!(storage.get("draft_visit_id").unwrap().as_deref(), Some("visit-7"));
    assert_eq!(storage.clears(), 1);
    assert_eq!(api.logout_count(), 0);

    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn network_errors_keep_session_alive() {
    let api = Arc::new(MockSessionApi::new());
    let (runtime, _) = runtime(&api);
    runtime.start();
    runtime.login("iyer@example.org", "pw").await.unwrap();
    api.fail_refreshes(Some(RefreshError::Network { reason: "offline".to_string() }));

    for _ in 0..12 {
        tokio::time::sleep(Duration::from_secs(60)).await;
        runtime.record_activity(ActivitySignal::Keyboard).await;
    }

    let snapshot = runtime.snapshot();
    assert!(snapshot.is_authenticated);
    assert!(!snapshot.is_expired);
    assert!(api.refresh_count() > 0);
    assert_eq!(runtime.current_token().await.map(|(_, t)| t).as_deref(), Some("tok-0"));

    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn restored_session_probes_on_first_tick() {
    let api = Arc::new(MockSessionApi::new());
    let storage = Arc::new(MemoryStorage::with_entries([
        ("access_token", "tok-persisted".to_string()),
        ("user", serde_json::to_string(&test_user()).unwrap()),
    ]));
    let config = SessionConfig { refresh_interval: HOUR, ..SessionConfig::default() };
    let runtime = runtime_with(&api, &storage, config);

    assert!(runtime.snapshot().is_authenticated);
    runtime.start();
    tokio::time::sleep(Duration::from_secs(13)).await;

    assert_eq!(api.calls(), vec![ApiCall::Refresh { token: Some("tok-persisted".to_string()) }]);
    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn logout_calls_backend_once() {
    let api = Arc::new(MockSessionApi::new());
    let (runtime, storage) = runtime(&api);
    runtime.start();
    runtime.login("iyer@example.org", "pw").await.unwrap();

    runtime.logout().await.unwrap();
    runtime.logout().await.unwrap();

    assert_eq!(api.logout_count(), 1);
    let snapshot = runtime.snapshot();
    assert!(!snapshot.is_authenticated);
    assert!(!snapshot.is_expired);
    assert_eq!(storage.get("user").unwrap(), None);

    runtime.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_backend_logout_still_clears_locally() {
    let api = Arc::new(MockSessionApi::new());
    api.script_logout(Err(RefreshError::Network { reason: "offline".to_string() }));
    let (runtime, storage) = runtime(&api);
    runtime.login("iyer@example.org", "pw").await.unwrap();

    runtime.logout().await.unwrap();

    assert!(!runtime.snapshot().is_authenticated);
    assert_eq!(storage.get("access_token").unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn expiry_during_slow_logout_happens_once() {
    let api = Arc::new(MockSessionApi::new().with_latency(Duration::from_secs(2)));
    let (runtime, storage) = runtime(&api);
    runtime.login("iyer@example.org", "pw").await.unwrap();
    let (epoch, _) = runtime.current_token().await.unwrap();

    let handle = runtime.handle();
    let logout = tokio::spawn(async move { handle.logout().await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    runtime.force_logout(epoch, true).await;
    logout.await.unwrap().unwrap();

    let snapshot = runtime.snapshot();
    assert!(snapshot.is_expired);
    assert_eq!(api.logout_count(), 1);
    assert_eq!(storage.clears(), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_now_reports_outcome() {
    let api = Arc::new(MockSessionApi::new());
    let (runtime, _) = runtime(&api);

    assert_eq!(runtime.refresh_now(RefreshOrigin::Gateway).await, RefreshOutcome::NoSession);

    runtime.login("iyer@example.org", "pw").await.unwrap();
    assert_eq!(runtime.refresh_now(RefreshOrigin::Gateway).await, RefreshOutcome::Refreshed);
    assert_eq!(runtime.current_token().await.map(|(_, t)| t).as_deref(), Some("tok-1"));

    api.script_refresh(Err(RefreshError::Unknown { reason: "500".to_string() }));
    assert_eq!(
        runtime.refresh_now(RefreshOrigin::Gateway).await,
        RefreshOutcome::Rejected(RefreshError::Unknown { reason: "500".to_string() })
    );
    assert!(runtime.snapshot().is_authenticated);
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent() {
    let api = Arc::new(MockSessionApi::new());
    let (runtime, _) = runtime(&api);

    runtime.start();
    runtime.start();
    assert_eq!(runtime.running_tasks(), 3);

    runtime.stop().await;
    runtime.stop().await;

    assert!(runtime.is_stopped());
    assert_eq!(runtime.running_tasks(), 0);
    assert!(matches!(runtime.login("iyer@example.org", "pw").await, Err(ClientError::Stopped)));

    runtime.start();
    assert_eq!(runtime.running_tasks(), 0);
}

#[tokio::test(start_paused = true)]
async fn stopped_runtime_makes_no_calls() {
    let api = Arc::new(MockSessionApi::new());
    let (runtime, _) = runtime(&api);
    runtime.start();
    runtime.login("iyer@example.org", "pw").await.unwrap();
    runtime.stop().await;

    let calls = api.calls().len();
    tokio::time::sleep(HOUR).await;
    runtime.record_activity(ActivitySignal::Keyboard).await;

    assert_eq!(api.calls().len(), calls);
    assert_eq!(runtime.refresh_now(RefreshOrigin::Gateway).await, RefreshOutcome::NoSession);
}

#[tokio::test(start_paused = true)]
async fn rejected_login_leaves_session_anonymous() {
    let api = Arc::new(MockSessionApi::new());
    api.script_login(Err(medsession_core::LoginError::Rejected { reason: "bad password".to_string() }));
    let (runtime, _) = runtime(&api);

    let result = runtime.login("iyer@example.org", "wrong").await;

    assert!(matches!(result, Err(ClientError::Login(_))));
    assert!(!runtime.snapshot().is_authenticated);
}
