use clinicdesk_core::SessionStore;
use clinicdesk_domain::Credential;
use parking_lot::RwLock;
use tracing::debug;

/// Process-local [`SessionStore`]
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    credential: RwLock<Option<Credential>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a signed-in credential
    pub fn with_credential(credential: Credential) -> Self {
        Self { credential: RwLock::new(Some(credential)) }
    }

    pub fn is_signed_in(&self) -> bool {
        self.credential.read().is_some()
    }
}

impl SessionStore for InMemorySessionStore {
    fn credential(&self) -> Option<Credential> {
        self.credential.read().clone()
    }

    fn set_credential(&self, credential: Credential) {
        *self.credential.write() = Some(credential);
        debug!("Session credential updated");
    }

    fn clear_credential(&self) {
        *self.credential.write() = None;
        debug!("Session credential cleared");
    }
}
