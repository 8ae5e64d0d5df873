use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use clinicdesk_core::{Transport, TransportError, TransportRequest, TransportResponse};
use clinicdesk_domain::constants::AUTHORIZATION_HEADER;
use parking_lot::Mutex;
use serde_json::Value;

type Reply = Result<TransportResponse, TransportError>;
type Handler = dyn Fn(&TransportRequest) -> Reply + Send + Sync;

/// In-memory `Transport` that answers through a handler closure.
///
/// Records every request it receives, in call order, and can simulate
/// latency with `tokio::time::sleep` so tests under paused time stay
/// deterministic.
pub struct FakeTransport {
    handler: Box<Handler>,
    latency: Duration,
    seen: Mutex<Vec<TransportRequest>>,
}

impl FakeTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&TransportRequest) -> Reply + Send + Sync + 'static,
    {
        Self { handler: Box::new(handler), latency: Duration::ZERO, seen: Mutex::new(Vec::new()) }
    }

    /// Answers every request with the same status and body.
    pub fn always(status: u16, body: Value) -> Self {
        Self::new(move |_| Ok(TransportResponse::new(status, body.clone())))
    }

    /// Plays `replies` in order, repeating the last one when exhausted.
    pub fn scripted(replies: Vec<Reply>) -> Self {
        let queue = Mutex::new(VecDeque::from(replies));
        Self::new(move |_| {
            let mut queue = queue.lock();
            if queue.len() > 1 {
                queue.pop_front().expect("non-empty script")
            } else {
                queue.front().cloned().expect("script must not be empty")
            }
        })
    }

    /// Answers 200 only to `Bearer fresh`, 401 to anything else.
    pub fn requiring_fresh_token() -> Self {
        Self::new(|request| {
            let status = match request.header(AUTHORIZATION_HEADER) {
                Some("Bearer fresh") => 200,
                _ => 401,
            };
            Ok(TransportResponse::new(status, serde_json::json!({ "url": request.url })))
        })
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: TransportRequest) -> Reply {
        self.seen.lock().push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.handler)(&request)
    }
}

pub fn ok(body: Value) -> Reply {
    Ok(TransportResponse::new(200, body))
}

pub fn status(code: u16) -> Reply {
    Ok(TransportResponse::new(code, serde_json::json!({ "message": format!("status {code}") })))
}

pub fn network_down() -> Reply {
    Err(TransportError::Network { message: "connection refused".to_string() })
}
