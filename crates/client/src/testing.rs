//! Test doubles shared by the unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::session::SessionManager;
use crate::store::MemoryStore;
use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};

/// What the mock server does with one request.
pub enum Reply {
    Respond(StatusCode, String),
    ConnectionRefused,
}

impl Reply {
    pub fn json(status: StatusCode, body: serde_json::Value) -> Self {
        Self::Respond(status, body.to_string())
    }

    pub fn status(status: StatusCode) -> Self {
        Self::Respond(status, String::new())
    }
}

type Responder = Box<dyn Fn(&ApiRequest) -> Reply + Send + Sync>;

/// [`Transport`] that answers from a closure and records every request.
///
/// Each send yields to the scheduler once before answering, so concurrent
/// callers interleave the way they would on a real network.
pub struct MockTransport {
    responder: Responder,
    sent: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new(responder: impl Fn(&ApiRequest) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Answer requests with `replies` in order.
    pub fn scripted(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        let queue = Mutex::new(replies.into_iter().collect::<VecDeque<_>>());
        Self::new(move |_| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Reply::ConnectionRefused)
        })
    }

    pub fn sent(&self) -> Vec<ApiRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_paths(&self) -> Vec<&'static str> {
        self.sent()
            .iter()
            .map(|request| request.endpoint.path())
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.sent_paths().iter().filter(|p| **p == path).count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.sent.lock().unwrap().push(request.clone());
        tokio::task::yield_now().await;
        match (self.responder)(request) {
            Reply::Respond(status, body) => Ok(ApiResponse::new(status, body)),
            Reply::ConnectionRefused => {
                Err(TransportError::Connect("connection refused".to_string()))
            }
        }
    }
}

/// A session over `transport` with a store holding `entries`.
pub fn session_with(
    transport: &Arc<MockTransport>,
    entries: &[(&str, &str)],
) -> (SessionManager, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_entries(entries.iter().copied()));
    let session = SessionManager::new(transport.clone(), store.clone());
    (session, store)
}

/// Stored value for `key`, for assertions.
pub async fn stored(store: &MemoryStore, key: &str) -> Option<String> {
    use crate::store::KeyValueStore;
    store.get(key).await.unwrap()
}
