//! `clinicctl` entry point
//!
//! Prints the response body as pretty JSON on stdout. On failure the
//! normalized error goes to stderr and the process exits non-zero.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use clinicdesk_cli::commands::error_report;
use clinicdesk_cli::{execute, AppContext, Cli};
use clinicdesk_infra::init_tracing;
use serde_json::Value;

/// Exit status for configuration and startup failures
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before anything reads the environment
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.log_format) {
        eprintln!("warning: {e}");
    }
    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Err(e) => tracing::debug!(error = %e, "No .env file loaded"),
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

/// Runs one command; `Err` is reserved for startup failures
async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let ctx = AppContext::load(cli.config.as_deref()).context("failed to initialize client")?;

    Ok(match execute(&ctx, cli.command).await {
        Ok(value) => {
            println!("{}", pretty(&value));
            ExitCode::SUCCESS
        }
        Err(error) => {
            tracing::error!(code = %error.code(), %error, "Request failed");
            eprintln!("{}", pretty(&error_report(&error)));
            ExitCode::FAILURE
        }
    })
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
