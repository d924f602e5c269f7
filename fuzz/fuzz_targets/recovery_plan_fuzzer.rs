//! Fuzz target for 401 recovery planning and error-body classification
//!
//! # Invariants
//!
//! - Only a 401 is ever recovered
//! - A credential endpoint is never refreshed and retried
//! - An expired payload always forces expiry, on any path
//! - Refresh rejection classification agrees with the payload
//! - NEVER panic on arbitrary bytes

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use medsession_core::{
    Endpoints, Recovery, RefreshError, api::ErrorBody, classify_rejection, plan_recovery,
};

#[derive(Debug, Clone, Arbitrary)]
enum FuzzPath {
    Login,
    Refresh,
    RefreshWithQuery(String),
    Other(String),
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    path: FuzzPath,
    unauthorized: bool,
    status: u16,
    body: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let endpoints = Endpoints::default();
    let path = match &input.path {
        FuzzPath::Login => endpoints.login.clone(),
        FuzzPath::Refresh => endpoints.refresh.clone(),
        FuzzPath::RefreshWithQuery(query) => format!("{}?{query}", endpoints.refresh),
        FuzzPath::Other(path) => format!("/{path}"),
    };
    let status = if input.unauthorized { 401 } else { input.status };

    let plan = plan_recovery(&path, status, &input.body, &endpoints);
    let expired = ErrorBody::parse(&input.body).is_session_expired();

    if status != 401 {
        assert_eq!(plan, Recovery::PassThrough);
    } else if expired {
        assert_eq!(plan, Recovery::ForceLogout { expired: true });
    } else if endpoints.is_credential_endpoint(&path) {
        assert_eq!(plan, Recovery::ForceLogout { expired: false });
    } else {
        assert_eq!(plan, Recovery::RefreshAndRetry);
    }

    if expired {
        assert_eq!(classify_rejection(status, &input.body), RefreshError::SessionExpired);
    }
});
