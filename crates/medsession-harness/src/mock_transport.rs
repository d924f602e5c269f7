//! Scripted [`Transport`] for gateway tests.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use medsession_client::{ApiRequest, ApiResponse, Transport, TransportError};

/// A request as the transport saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct SeenRequest {
    /// Request sent.
    pub request: ApiRequest,
    /// Bearer token attached, if any.
    pub bearer: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    responses: VecDeque<Result<ApiResponse, TransportError>>,
    seen: Vec<SeenRequest>,
}

/// Answers from a queue; `200 {}` once the queue is empty.
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<State>,
}

impl MockTransport {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a response.
    pub fn respond(&self, status: u16, body: &str) {
        self.lock().responses.push_back(Ok(ApiResponse { status, body: body.as_bytes().to_vec() }));
    }

    /// Queue a transport failure.
    pub fn fail(&self, error: TransportError) {
        self.lock().responses.push_back(Err(error));
    }

    /// Every request so far, in order.
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.lock().seen.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, TransportError> {
        let mut state = self.lock();
        state.seen.push(SeenRequest { request: request.clone(), bearer: bearer.map(str::to_string) });
        state
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok(ApiResponse { status: 200, body: b"{}".to_vec() }))
    }
}
