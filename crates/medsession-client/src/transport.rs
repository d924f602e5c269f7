//! HTTP transport seam.
//!
//! [`Transport`] moves one JSON request and returns whatever the backend
//! answered, status included. It never interprets statuses: a 401 is a
//! successful transport result. Interpretation belongs to
//! [`HttpSessionApi`](crate::HttpSessionApi) and [`Gateway`](crate::Gateway).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::de::DeserializeOwned;

use crate::error::TransportError;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
        }
    }
}

/// Request relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute path, optionally with a query string.
    pub path: String,
    /// JSON body.
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// GET `path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: Method::Get, path: path.into(), body: None }
    }

    /// POST `path` with a JSON body.
    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self { method: Method::Post, path: path.into(), body: Some(body) }
    }

    /// POST `path` with no body.
    pub fn post_empty(path: impl Into<String>) -> Self {
        Self { method: Method::Post, path: path.into(), body: None }
    }
}

/// Raw response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Sends requests to the backend.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send `request`, attaching `Authorization: Bearer <token>` when a token
    /// is given.
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, TransportError> {
        (**self).execute(request, bearer).await
    }
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl ReqwestTransport {
    /// Build a transport for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// - `TransportError::InvalidUrl` if `base_url` does not parse
    /// - `TransportError::Request` if the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = reqwest::Url::parse(base_url)
            .map_err(|e| TransportError::InvalidUrl { reason: e.to_string() })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::Request { reason: e.to_string() })?;

        Ok(Self { client, base_url })
    }

    /// Base URL every path is joined onto.
    pub fn base_url(&self) -> &reqwest::Url {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> Result<reqwest::Url, TransportError> {
        let joined = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        reqwest::Url::parse(&joined).map_err(|e| TransportError::InvalidUrl { reason: e.to_string() })
    }
}

fn map_reqwest_error(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect { reason: e.to_string() }
    } else {
        TransportError::Request { reason: e.to_string() }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(&request.path)?;
        let mut builder = self.client.request(request.method.into(), url);

        if let Some(token) = bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TransportError::Request { reason: format!("invalid auth header: {e}") })?;
            builder = builder.header(AUTHORIZATION, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| map_reqwest_error(&e))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| map_reqwest_error(&e))?.to_vec();

        tracing::trace!(method = ?request.method, path = %request.path, status, "HTTP exchange");

        Ok(ApiResponse { status, body })
    }
}
