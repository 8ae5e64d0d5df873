//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clinicdesk_infra::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "clinicctl", version)]
#[command(about = "Call the ClinicDesk API through the resilient client", long_about = None)]
pub struct Cli {
    /// Config file (JSON or TOML); defaults to environment, then probed files
    #[arg(short, long, global = true, env = "CLINICDESK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format: pretty or json
    #[arg(long, global = true, default_value = "pretty", env = "CLINICDESK_LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// GET a resource and print its body
    Get {
        /// Path relative to the base URL, or an absolute URL
        path: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_parser = parse_key_val)]
        query: Vec<(String, String)>,

        /// Bypass the response cache
        #[arg(long)]
        no_cache: bool,
    },

    /// GET one page of a paginated list
    Page {
        path: String,

        /// Zero-based page number
        #[arg(long, default_value_t = 0)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        size: u32,
    },

    /// Print the effective configuration
    Config,
}

/// Parse `key=value`; the value may itself contain `=`
pub fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got `{raw}`")),
    }
}
