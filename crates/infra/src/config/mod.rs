//! Configuration loading
//!
//! This module builds a validated [`ClientConfig`] from environment
//! variables or a config file.
//!
//! [`ClientConfig`]: clinicdesk_domain::ClientConfig

pub mod loader;

// Re-export commonly used items
pub use loader::{load, load_from_env, load_from_file, probe_config_paths};
