//! Session handling: ports and single-flight token refresh

pub mod coordinator;
pub mod ports;

pub use coordinator::{AuthRecoveryError, AuthRefreshCoordinator};
pub use ports::{NoopSessionHook, RefreshError, SessionExpiredHook, SessionStore, TokenRefresher};
