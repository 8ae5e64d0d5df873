use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use clinicdesk_core::{RefreshError, SessionExpiredHook, SessionStore, TokenRefresher};
use clinicdesk_domain::Credential;
use parking_lot::Mutex;

/// Session store backed by a mutex.
#[derive(Default)]
pub struct MemorySession {
    credential: Mutex<Option<Credential>>,
}

impl MemorySession {
    pub fn with(credential: Credential) -> Self {
        Self { credential: Mutex::new(Some(credential)) }
    }

    /// Access token currently stored, if any.
    pub fn credential_token(&self) -> Option<String> {
        self.credential.lock().as_ref().map(|credential| credential.access_token.clone())
    }
}

impl SessionStore for MemorySession {
    fn credential(&self) -> Option<Credential> {
        self.credential.lock().clone()
    }

    fn set_credential(&self, credential: Credential) {
        *self.credential.lock() = Some(credential);
    }

    fn clear_credential(&self) {
        *self.credential.lock() = None;
    }
}

/// Refresher that waits `delay` and then returns a fixed outcome.
pub struct StubRefresher {
    outcome: Result<Credential, RefreshError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StubRefresher {
    /// Issues the `fresh` access token.
    pub fn succeeding(delay: Duration) -> Self {
        Self { outcome: Ok(Credential::new("fresh", "r2")), delay, calls: AtomicUsize::new(0) }
    }

    pub fn failing(error: RefreshError) -> Self {
        Self { outcome: Err(error), delay: Duration::ZERO, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for StubRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<Credential, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.clone()
    }
}

/// Counts session-expired notifications.
#[derive(Default)]
pub struct CountingHook {
    fired: AtomicUsize,
}

impl CountingHook {
    pub fn fired(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }
}

impl SessionExpiredHook for CountingHook {
    fn on_session_expired(&self) {
        self.fired.fetch_add(1, Ordering::SeqCst);
    }
}
