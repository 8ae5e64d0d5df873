//! Resilient API client and its transport port

pub mod options;
pub mod policy;
pub mod ports;
pub mod resilient;

pub use options::RequestOptions;
pub use policy::{AttemptError, HttpRetryPolicy};
pub use ports::{Transport, TransportError, TransportRequest, TransportResponse};
pub use resilient::{ResilientClient, ResilientClientBuilder};
