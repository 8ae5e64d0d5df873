//! Tracing subscriber setup for binaries

pub mod logging;

pub use logging::{init_tracing, LogFormat, DEFAULT_FILTER};
