use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ Result, StoreError };

const DB_URL: &str = "DB_URL";
const DB_MAX_CONNECTIONS: &str = "DB_MAX_CONNECTIONS";
const DB_ACQUIRE_TIMEOUT_SECS: &str = "DB_ACQUIRE_TIMEOUT_SECS";
const DB_SQL_LOGGING: &str = "DB_SQL_LOGGING";

const DEFAULT_ENV_FILE: &str = ".env";

/// Database settings resolved from environment variables, falling back to a `.env` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_url: String,
    pub max_connections: Option<u32>,
    pub acquire_timeout: Option<Duration>,
    pub sql_logging: bool,
}

impl Settings {
    pub fn new(db_url: impl Into<String>) -> Self {
        Self {
            db_url: db_url.into(),
            max_connections: None,
            acquire_timeout: None,
            sql_logging: false,
        }
    }

    /// Process environment first, then `./.env`. Unknown keys are ignored.
    pub fn from_env() -> Result<Self> {
        Self::from_sources(|key| env::var(key).ok(), Some(Path::new(DEFAULT_ENV_FILE)))
    }

    /// Resolve settings from an arbitrary variable lookup layered over an optional env file.
    ///
    /// The file is parsed but never exported into the process environment. A missing
    /// file is treated as empty.
    pub fn from_sources<F>(lookup: F, env_file: Option<&Path>) -> Result<Self>
        where F: Fn(&str) -> Option<String>
    {
        let file_vars = match env_file {
            Some(path) if path.exists() => read_env_file(path)?,
            _ => HashMap::new(),
        };

        let get = |key: &str| -> Option<String> {
            lookup(key)
                .or_else(|| lookup(&key.to_lowercase()))
                .or_else(|| file_vars.get(key).cloned())
                .filter(|value| !value.trim().is_empty())
        };

        let db_url = get(DB_URL).ok_or_else(||
            StoreError::Configuration(
                format!("{} must be set in the environment or in {}", DB_URL, DEFAULT_ENV_FILE)
            )
        )?;

        let max_connections = get(DB_MAX_CONNECTIONS)
            .map(|v| parse_value::<u32>(DB_MAX_CONNECTIONS, &v))
            .transpose()?;
        if max_connections == Some(0) {
            return Err(
                StoreError::Configuration(format!("{} must be at least 1", DB_MAX_CONNECTIONS))
            );
        }

        let acquire_timeout = get(DB_ACQUIRE_TIMEOUT_SECS)
            .map(|v| parse_value::<u64>(DB_ACQUIRE_TIMEOUT_SECS, &v))
            .transpose()?
            .map(Duration::from_secs);

        let sql_logging = get(DB_SQL_LOGGING)
            .map(|v| parse_bool(DB_SQL_LOGGING, &v))
            .transpose()?
            .unwrap_or(false);

        Ok(Settings {
            db_url: db_url.trim().to_string(),
            max_connections,
            acquire_timeout,
            sql_logging,
        })
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }
}

// Keys are upper-cased so `db_url=` in the file matches `DB_URL`.
//
// `from_path_iter` is deprecated in favour of `from_path`, which exports into the process
// environment. Only the iterator parses without mutating it, and `dotenv` 0.15 keeps `Iter` private.
#[allow(deprecated)]
fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let iter = dotenv::from_path_iter(path).map_err(|e|
        StoreError::Configuration(format!("Failed to read {}: {}", path.display(), e))
    )?;

    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e|
            StoreError::Configuration(format!("Invalid line in {}: {}", path.display(), e))
        )?;
        vars.insert(key.to_uppercase(), value);
    }

    Ok(vars)
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| StoreError::Configuration(format!("{} has an invalid value: {}", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(StoreError::Configuration(format!("{} must be a boolean, got {}", key, value))),
    }
}
