//! Domain types exchanged between the client, its ports and its callers

pub mod auth;
pub mod http;
pub mod page;

pub use auth::Credential;
pub use http::{HttpMethod, NormalizedResponse};
pub use page::Page;
