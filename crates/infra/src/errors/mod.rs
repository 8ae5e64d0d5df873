//! Error conversions at the infrastructure boundary

pub mod conversions;

pub use conversions::{IntoStoreError, IntoTransportError};
