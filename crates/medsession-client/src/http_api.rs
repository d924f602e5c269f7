//! HTTP implementation of [`SessionApi`].

use async_trait::async_trait;
use medsession_core::{
    Endpoints, LoginError, LoginGrant, RefreshError, SessionApi,
    api::{Envelope, ErrorBody, RefreshData},
    classify_rejection,
};
use serde_json::json;

use crate::{
    error::TransportError,
    transport::{ApiRequest, ApiResponse, Transport},
};

/// Session endpoints spoken over a [`Transport`].
///
/// Every response is classified into the `RefreshError` taxonomy here; the
/// credential store is never touched.
#[derive(Debug, Clone)]
pub struct HttpSessionApi<T> {
    transport: T,
    endpoints: Endpoints,
}

impl<T: Transport> HttpSessionApi<T> {
    /// Create an API client.
    pub fn new(transport: T, endpoints: Endpoints) -> Self {
        Self { transport, endpoints }
    }

    /// Configured endpoint paths.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn post(
        &self,
        path: &str,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, RefreshError> {
        self.transport.execute(&ApiRequest::post_empty(path), bearer).await.map_err(network)
    }

    /// Best-effort calls only fail on an error status or an explicit
    /// `success: false`.
    async fn acknowledge(&self, path: &str, access_token: &str) -> Result<(), RefreshError> {
        let response = self.post(path, Some(access_token)).await?;

        if !response.is_success() || explicitly_unsuccessful(&response) {
            return Err(classify_rejection(response.status, &response.body));
        }

        Ok(())
    }
}

fn network(e: TransportError) -> RefreshError {
    RefreshError::Network { reason: e.to_string() }
}

fn explicitly_unsuccessful(response: &ApiResponse) -> bool {
    response
        .json::<serde_json::Value>()
        .ok()
        .and_then(|v| v.get("success").and_then(serde_json::Value::as_bool))
        == Some(false)
}

#[async_trait]
impl<T: Transport> SessionApi for HttpSessionApi<T> {
    async fn login(&self, email: &str, password: &str) -> Result<LoginGrant, LoginError> {
        let request =
            ApiRequest::post(self.endpoints.login.clone(), json!({ "email": email, "password": password }));

        let response = self
            .transport
            .execute(&request, None)
            .await
            .map_err(|e| LoginError::Network { reason: e.to_string() })?;

        if !response.is_success() {
            let reason = ErrorBody::parse(&response.body).describe().to_string();
            return Err(match response.status {
                400 | 401 | 403 => LoginError::Rejected { reason },
                status => LoginError::Unknown { reason: format!("status {status}: {reason}") },
            });
        }

        let envelope: Envelope<LoginGrant> = response
            .json()
            .map_err(|e| LoginError::Unknown { reason: format!("malformed login body: {e}") })?;

        match envelope.data {
            Some(grant) if envelope.success && !grant.access_token.is_empty() => Ok(grant),
            _ if !envelope.success => Err(LoginError::Rejected {
                reason: envelope.message.unwrap_or_default(),
            }),
            _ => Err(LoginError::Unknown { reason: "login response without token".to_string() }),
        }
    }

    async fn refresh(&self, access_token: Option<&str>) -> Result<String, RefreshError> {
        let response = self.post(&self.endpoints.refresh, access_token).await?;

        if !response.is_success() {
            return Err(classify_rejection(response.status, &response.body));
        }

        let Ok(envelope) = response.json::<Envelope<RefreshData>>() else {
            return Err(RefreshError::Unknown { reason: "malformed refresh body".to_string() });
        };

        if !envelope.success {
            return Err(classify_rejection(response.status, &response.body));
        }

        match envelope.data {
            Some(data) if !data.access_token.is_empty() => Ok(data.access_token),
            _ => Err(RefreshError::Unknown { reason: "refresh response without token".to_string() }),
        }
    }

    async fn notify_activity(&self, access_token: &str) -> Result<(), RefreshError> {
        self.acknowledge(&self.endpoints.activity, access_token).await
    }

    async fn logout(&self, access_token: &str) -> Result<(), RefreshError> {
        self.acknowledge(&self.endpoints.logout, access_token).await
    }
}
