//! Configuration loader
//!
//! Loads the client configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `CLINICDESK_BASE_URL` is unset, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! Whatever the source, the result is validated before it is returned.
//!
//! ## Environment Variables
//! - `CLINICDESK_BASE_URL`: API base URL (required for the env source)
//! - `CLINICDESK_FAILURE_THRESHOLD`: Failures that open the circuit
//! - `CLINICDESK_RESET_TIMEOUT_MS`: Open-circuit cool-down
//! - `CLINICDESK_MAX_RETRIES`: Retries after the first attempt
//! - `CLINICDESK_BASE_DELAY_MS` / `CLINICDESK_MAX_DELAY_MS`: Backoff bounds
//! - `CLINICDESK_JITTER`: `none`, `full` or `equal`
//! - `CLINICDESK_CACHE_TTL_MS` / `CLINICDESK_CACHE_MAX_SIZE`: Cache limits
//! - `CLINICDESK_CACHE_NAMESPACE`: Key namespace of the persistent tier
//! - `CLINICDESK_CACHE_PATH`: SQLite file for the persistent tier
//! - `CLINICDESK_REFRESH_PATH`: Token refresh endpoint path
//! - `CLINICDESK_REQUEST_TIMEOUT_MS`: Default whole-request deadline
//!
//! Unset optional variables keep their defaults.
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./clinicdesk.{json,toml}` or `./config.{json,toml}`
//! 2. The same names one and two directories up
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clinicdesk_domain::{ClientConfig, ClinicDeskError, JitterMode, Result};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["clinicdesk.json", "clinicdesk.toml", "config.json", "config.toml"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `ClinicDeskError::Config` if neither source yields a valid
/// configuration.
pub fn load() -> Result<ClientConfig> {
    if std::env::var_os("CLINICDESK_BASE_URL").is_some() {
        let config = load_from_env()?;
        tracing::info!("Configuration loaded from environment variables");
        return Ok(config);
    }

    tracing::debug!("CLINICDESK_BASE_URL not set, trying config file");
    load_from_file(None)
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `ClinicDeskError::Config` if `CLINICDESK_BASE_URL` is missing,
/// a variable has an invalid value or the result fails validation.
pub fn load_from_env() -> Result<ClientConfig> {
    let mut config = ClientConfig::new(env_var("CLINICDESK_BASE_URL")?);

    if let Some(value) = env_parse("CLINICDESK_FAILURE_THRESHOLD")? {
        config.failure_threshold = value;
    }
    if let Some(value) = env_millis("CLINICDESK_RESET_TIMEOUT_MS")? {
        config.reset_timeout = value;
    }
    if let Some(value) = env_parse("CLINICDESK_MAX_RETRIES")? {
        config.max_retries = value;
    }
    if let Some(value) = env_millis("CLINICDESK_BASE_DELAY_MS")? {
        config.base_delay = value;
    }
    if let Some(value) = env_millis("CLINICDESK_MAX_DELAY_MS")? {
        config.max_delay = value;
    }
    if let Some(value) = env_parse::<JitterMode>("CLINICDESK_JITTER")? {
        config.jitter = value;
    }
    if let Some(value) = env_millis("CLINICDESK_CACHE_TTL_MS")? {
        config.cache_ttl = value;
    }
    if let Some(value) = env_parse("CLINICDESK_CACHE_MAX_SIZE")? {
        config.cache_max_size = value;
    }
    if let Some(value) = env_opt("CLINICDESK_CACHE_NAMESPACE") {
        config.cache_namespace = value;
    }
    if let Some(value) = env_opt("CLINICDESK_CACHE_PATH") {
        config.cache_path = Some(PathBuf::from(value));
    }
    if let Some(value) = env_opt("CLINICDESK_REFRESH_PATH") {
        config.refresh_path = value;
    }
    if let Some(value) = env_millis("CLINICDESK_REQUEST_TIMEOUT_MS")? {
        config.request_timeout = Some(value);
    }

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Fields missing from the file keep their defaults.
///
/// # Errors
/// Returns `ClinicDeskError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - The parsed configuration fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<ClientConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ClinicDeskError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            ClinicDeskError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| ClinicDeskError::Config(format!("Failed to read config file: {}", e)))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration by file extension (`.json` or `.toml`)
fn parse_config(contents: &str, path: &Path) -> Result<ClientConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ClinicDeskError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ClinicDeskError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(ClinicDeskError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.push(exe_dir.to_path_buf());
        }
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        ClinicDeskError::Config(format!("Missing required environment variable: {}", key))
    })
}

/// Optional variable; blank counts as unset
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| ClinicDeskError::Config(format!("Invalid value for {}: {}", key, e)))
        })
        .transpose()
}

fn env_millis(key: &str) -> Result<Option<Duration>> {
    Ok(env_parse::<u64>(key)?.map(Duration::from_millis))
}
