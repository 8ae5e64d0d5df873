//! Shared test helpers for `clinicdesk-core` integration tests.
//!
//! These helpers provide lightweight fakes for the client's ports so the
//! integration tests can focus on behaviour instead of boilerplate.

#![allow(dead_code)]

pub mod auth;
pub mod transport;

use std::sync::Arc;

use clinicdesk_core::ResilientClient;
use clinicdesk_domain::{ClientConfig, Credential};

pub use auth::{CountingHook, MemorySession, StubRefresher};
pub use transport::FakeTransport;

pub const BASE_URL: &str = "http://clinic.test/api";

/// Handles to every fake wired into a test client
pub struct Harness {
    pub client: Arc<ResilientClient>,
    pub transport: Arc<FakeTransport>,
    pub refresher: Arc<StubRefresher>,
    pub session: Arc<MemorySession>,
    pub hook: Arc<CountingHook>,
}

/// Client over the given fakes with a `stale`/`r1` session
pub fn harness(
    config: ClientConfig,
    transport: Arc<FakeTransport>,
    refresher: Arc<StubRefresher>,
) -> Harness {
    let session = Arc::new(MemorySession::with(Credential::new("stale", "r1")));
    let hook = Arc::new(CountingHook::default());
    let client = ResilientClient::builder(config)
        .transport(transport.clone())
        .session(session.clone())
        .refresher(refresher.clone())
        .on_session_expired(hook.clone())
        .build()
        .expect("valid client");

    Harness { client: Arc::new(client), transport, refresher, session, hook }
}

pub fn config() -> ClientConfig {
    ClientConfig::new(BASE_URL)
}
