//! Session store and token refresh adapters

pub mod refresher;
pub mod session;

pub use refresher::HttpTokenRefresher;
pub use session::InMemorySessionStore;
