//! # ClinicDesk Domain
//!
//! Types shared by the API client and its callers.
//!
//! This crate contains:
//! - Wire types (`Credential`, `HttpMethod`, `NormalizedResponse`, `Page`)
//! - Caller-facing errors (`ClientError`, `ApiError`, `ErrorCode`)
//! - Client configuration (`ClientConfig`) and its defaults
//!
//! ## Architecture
//! - Depends only on the foundation tier of `clinicdesk-common`
//! - No I/O, no async runtime

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
