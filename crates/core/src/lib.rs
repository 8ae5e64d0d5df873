//! # ClinicDesk Core
//!
//! The resilient API client - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces (traits) for the transport, session and token refresh
//! - Single-flight token refresh with request replay
//! - `ResilientClient`: cache, circuit breaker, retry and auth recovery
//!   composed around the raw transport
//!
//! ## Architecture Principles
//! - Only depends on `clinicdesk-common` and `clinicdesk-domain`
//! - No HTTP library, database or platform code
//! - All external dependencies via traits

pub mod auth;
pub mod client;

// Re-export specific items to avoid ambiguity
pub use auth::{
    AuthRecoveryError, AuthRefreshCoordinator, NoopSessionHook, RefreshError, SessionExpiredHook,
    SessionStore, TokenRefresher,
};
pub use client::{
    AttemptError, HttpRetryPolicy, RequestOptions, ResilientClient, ResilientClientBuilder,
    Transport, TransportError, TransportRequest, TransportResponse,
};
