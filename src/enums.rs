use std::fmt;
use std::str::FromStr;

use sea_orm::DbBackend;

use crate::error::StoreError;

/// SQL engines the store can be pointed at through `DB_URL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
    Postgres,
    Duckdb,
}

impl Dialect {
    /// Canonical URL scheme.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
            Dialect::Duckdb => "duckdb",
        }
    }

    /// Query builder used to render statements. DuckDB reads the PostgreSQL dialect.
    pub fn backend(&self) -> DbBackend {
        match self {
            Dialect::Sqlite => DbBackend::Sqlite,
            Dialect::Postgres | Dialect::Duckdb => DbBackend::Postgres,
        }
    }

    /// Dialect named by the scheme of a connection string.
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .filter(|scheme| !scheme.is_empty())
            .ok_or_else(|| StoreError::Connection(format!("Malformed database URL: {}", url)))?;

        scheme.parse()
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "duckdb" => Ok(Dialect::Duckdb),
            other => Err(StoreError::Connection(format!("Unsupported database dialect: {}", other))),
        }
    }
}
