//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use lifecycle::ControllerSettings;
use thiserror::Error;

/// Longest accepted pickup credential lifetime, one year.
pub const MAX_PICKUP_TTL_HOURS: i64 = 24 * 366;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::Invalid {
                key: "LOG_FORMAT",
                value: s.to_string(),
            }),
        }
    }
}

/// A variable was set to something unparseable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` / `PORT`: bind address (default: `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json`
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory storage when unset
/// - `BLOB_DIR`: directory for uploaded files; in-memory when unset
/// - `CATALOG_PATH`: JSON catalog seed
/// - `PICKUP_TTL_HOURS`: pickup credential lifetime (default: 48, at most one year)
/// - `MAX_UPLOAD_BYTES`: request body limit (default: 25 MiB)
/// - `REQUEST_TIMEOUT_SECS`: request timeout (default: 30)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub blob_dir: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
    pub pickup_ttl_hours: i64,
    pub max_upload_bytes: usize,
    pub request_timeout_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse(&get, "PORT")?.unwrap_or(defaults.port),
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse(&get, "LOG_FORMAT")?.unwrap_or(defaults.log_format),
            database_url: get("DATABASE_URL"),
            blob_dir: get("BLOB_DIR").map(PathBuf::from),
            catalog_path: get("CATALOG_PATH").map(PathBuf::from),
            pickup_ttl_hours: pickup_ttl_hours(&get)?.unwrap_or(defaults.pickup_ttl_hours),
            max_upload_bytes: parse(&get, "MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.max_upload_bytes),
            request_timeout_secs: parse(&get, "REQUEST_TIMEOUT_SECS")?
                .unwrap_or(defaults.request_timeout_secs),
        })
    }

    /// Controller tunables derived from this configuration.
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            pickup_ttl: chrono::Duration::hours(self.pickup_ttl_hours),
            ..ControllerSettings::default()
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| {
            value.trim().parse().map_err(|_| ConfigError::Invalid {
                key,
                value: value.clone(),
            })
        })
        .transpose()
}

/// Non-positive values fall back to the default; values above
/// `MAX_PICKUP_TTL_HOURS` are rejected.
fn pickup_ttl_hours<G>(get: &G) -> Result<Option<i64>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let key = "PICKUP_TTL_HOURS";
    match parse::<i64, G>(get, key)? {
        Some(hours) if hours > MAX_PICKUP_TTL_HOURS => Err(ConfigError::Invalid {
            key,
            value: hours.to_string(),
        }),
        Some(hours) if hours > 0 => Ok(Some(hours)),
        _ => Ok(None),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            blob_dir: None,
            catalog_path: None,
            pickup_ttl_hours: 48,
            max_upload_bytes: 25 * 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}
