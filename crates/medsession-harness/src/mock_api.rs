//! Scripted [`SessionApi`].
//!
//! Each endpoint answers from its own queue of scripted results and falls
//! back to a default once the queue is empty. Every call is appended to an
//! ordered log so tests can assert on sequencing (notify before refresh,
//! logout at most once).

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use medsession_core::{LoginError, LoginGrant, RefreshError, Role, SessionApi, UserProfile};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    /// `login(email, _)`.
    Login {
        /// Email used.
        email: String,
    },
    /// `refresh(token)`.
    Refresh {
        /// Token sent.
        token: Option<String>,
    },
    /// `notify_activity(token)`.
    NotifyActivity {
        /// Token sent.
        token: String,
    },
    /// `logout(token)`.
    Logout {
        /// Token sent.
        token: String,
    },
}

#[derive(Debug)]
struct Script {
    login: VecDeque<Result<LoginGrant, LoginError>>,
    refresh: VecDeque<Result<String, RefreshError>>,
    refresh_default: Option<RefreshError>,
    activity: VecDeque<Result<(), RefreshError>>,
    logout: VecDeque<Result<(), RefreshError>>,
    calls: Vec<ApiCall>,
    issued_tokens: u64,
    latency: Duration,
}

/// Backend double with scripted answers and a call log.
#[derive(Debug)]
pub struct MockSessionApi {
    script: Mutex<Script>,
}

impl Default for MockSessionApi {
    fn default() -> Self {
        Self::new()
    }
}

/// Profile returned by the default login.
pub fn test_user() -> UserProfile {
    UserProfile {
        id: 42,
        name: "Dr. Meera Iyer".to_string(),
        email: "iyer@example.org".to_string(),
        role: Role::Faculty,
    }
}

impl MockSessionApi {
    /// Healthy backend: logins succeed, refreshes mint `tok-1`, `tok-2`, ...
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                login: VecDeque::new(),
                refresh: VecDeque::new(),
                refresh_default: None,
                activity: VecDeque::new(),
                logout: VecDeque::new(),
                calls: Vec::new(),
                issued_tokens: 0,
                latency: Duration::ZERO,
            }),
        }
    }

    /// Delay every answer by `latency` (tokio time).
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the next login result.
    pub fn script_login(&self, result: Result<LoginGrant, LoginError>) {
        self.lock().login.push_back(result);
    }

    /// Queue the next refresh result.
    pub fn script_refresh(&self, result: Result<String, RefreshError>) {
        self.lock().refresh.push_back(result);
    }

    /// Fail every unscripted refresh with `error` (or succeed again with
    /// `None`).
    pub fn fail_refreshes(&self, error: Option<RefreshError>) {
        self.lock().refresh_default = error;
    }

    /// Queue the next activity notification result.
    pub fn script_activity(&self, result: Result<(), RefreshError>) {
        self.lock().activity.push_back(result);
    }

    /// Queue the next logout result.
    pub fn script_logout(&self, result: Result<(), RefreshError>) {
        self.lock().logout.push_back(result);
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    /// Number of refresh calls.
    pub fn refresh_count(&self) -> usize {
        self.count(|c| matches!(c, ApiCall::Refresh { .. }))
    }

    /// Number of activity notifications.
    pub fn activity_count(&self) -> usize {
        self.count(|c| matches!(c, ApiCall::NotifyActivity { .. }))
    }

    /// Number of logout calls.
    pub fn logout_count(&self) -> usize {
        self.count(|c| matches!(c, ApiCall::Logout { .. }))
    }

    fn count(&self, f: impl Fn(&ApiCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| f(c)).count()
    }

    async fn delay(&self) {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl SessionApi for MockSessionApi {
    async fn login(&self, email: &str, _password: &str) -> Result<LoginGrant, LoginError> {
        let result = {
            let mut script = self.lock();
            script.calls.push(ApiCall::Login { email: email.to_string() });
            script.login.pop_front().unwrap_or_else(|| {
                Ok(LoginGrant { access_token: "tok-0".to_string(), user: test_user() })
            })
        };
        self.delay().await;
        result
    }

    async fn refresh(&self, access_token: Option<&str>) -> Result<String, RefreshError> {
        let result = {
            let mut script = self.lock();
            script.calls.push(ApiCall::Refresh { token: access_token.map(str::to_string) });
            match script.refresh.pop_front() {
                Some(result) => result,
                None => match script.refresh_default.clone() {
                    Some(error) => Err(error),
                    None => {
                        script.issued_tokens += 1;
                        Ok(format!("tok-{}", script.issued_tokens))
                    },
                },
            }
        };
        self.delay().await;
        result
    }

    async fn notify_activity(&self, access_token: &str) -> Result<(), RefreshError> {
        let result = {
            let mut script = self.lock();
            script.calls.push(ApiCall::NotifyActivity { token: access_token.to_string() });
            script.activity.pop_front().unwrap_or(Ok(()))
        };
        self.delay().await;
        result
    }

    async fn logout(&self, access_token: &str) -> Result<(), RefreshError> {
        let result = {
            let mut script = self.lock();
            script.calls.push(ApiCall::Logout { token: access_token.to_string() });
            script.logout.pop_front().unwrap_or(Ok(()))
        };
        self.delay().await;
        result
    }
}
