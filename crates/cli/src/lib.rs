//! # ClinicDesk CLI
//!
//! `clinicctl`: call the clinic API through the resilient client from a
//! terminal or a script.
//!
//! This crate contains:
//! - Argument parsing (`cli`)
//! - Client wiring from config and environment (`context`)
//! - Command handlers returning JSON (`commands`)

pub mod cli;
pub mod commands;
pub mod context;

pub use cli::{Cli, Command};
pub use commands::execute;
pub use context::AppContext;
