//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

const ENV_PREFIX: &str = "SHUTDOWN_LOG_";

/// Longest accepted session lifetime: one year.
pub const MAX_SESSION_TTL_HOURS: u64 = 365 * 24;

/// Service configuration, built from `SHUTDOWN_LOG_*` environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Path to the libSQL database file.
    pub db_path: PathBuf,
    /// How long a sign-in stays valid.
    pub session_ttl: Duration,
    /// Allowed browser origin for CORS. `None` allows any origin.
    pub cors_origin: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/shutdown-log.db"),
            session_ttl: Duration::from_secs(7 * 24 * 3600), // 1 week
            cors_origin: None,
        }
    }
}

impl AppConfig {
    /// Build config from the process environment, falling back to defaults
    /// for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = match get("PORT") {
            Some(raw) => parse_value("PORT", &raw)?,
            None => defaults.port,
        };

        let db_path = get("DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path);

        let session_ttl = match get("SESSION_TTL_HOURS") {
            Some(raw) => {
                let hours: u64 = parse_value("SESSION_TTL_HOURS", &raw)?;
                if !(1..=MAX_SESSION_TTL_HOURS).contains(&hours) {
                    return Err(ConfigError::InvalidValue {
                        key: format!("{ENV_PREFIX}SESSION_TTL_HOURS"),
                        message: format!("must be between 1 and {MAX_SESSION_TTL_HOURS}"),
                    });
                }
                let secs = hours.checked_mul(3600).ok_or_else(|| ConfigError::InvalidValue {
                    key: format!("{ENV_PREFIX}SESSION_TTL_HOURS"),
                    message: format!("{hours} hours overflows"),
                })?;
                Duration::from_secs(secs)
            }
            None => defaults.session_ttl,
        };

        Ok(Self {
            port,
            db_path,
            session_ttl,
            cors_origin: get("CORS_ORIGIN"),
        })
    }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: format!("{ENV_PREFIX}{name}"),
        message: format!("{raw:?}: {e}"),
    })
}
