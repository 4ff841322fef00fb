use std::path::PathBuf;

use url::Url;

use crate::enums::Dialect;
use crate::error::{ Result, StoreError };

const MEMORY: &str = ":memory:";

/// A parsed `DB_URL`: which engine it names and where the data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseTarget {
    dialect: Dialect,
    url: String,
}

impl DatabaseTarget {
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        let dialect = Dialect::from_url(url)?;

        if dialect == Dialect::Postgres {
            let parsed = Url::parse(url).map_err(|e|
                StoreError::Connection(format!("Malformed database URL: {}", e))
            )?;
            if database_name(&parsed).is_none() {
                return Err(StoreError::Connection("Database URL has no database name".to_string()));
            }
        }

        Ok(Self { dialect, url: url.to_string() })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// URL handed to the driver. SQLite files are opened read-write-create unless a mode is given.
    pub fn connect_url(&self) -> String {
        match self.dialect {
            Dialect::Sqlite if self.sqlite_path().is_some() && !self.url.contains("mode=") => {
                let separator = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}mode=rwc", self.url, separator)
            }
            _ => self.url.clone(),
        }
    }

    /// Database file for SQLite targets, `None` for in-memory databases and other engines.
    ///
    /// Paths follow sqlx: everything after `sqlite://` is the path, so `sqlite:///data/w.db`
    /// is the absolute `/data/w.db` and `sqlite://w.db` is relative to the working directory.
    /// SQLAlchemy differs: it reads `sqlite:///w.db` as relative and needs four slashes for an
    /// absolute path. A four-slash URL here yields `//data/w.db`, which still names the same file.
    pub fn sqlite_path(&self) -> Option<PathBuf> {
        if self.dialect != Dialect::Sqlite {
            return None;
        }
        self.file_path("sqlite:")
    }

    /// Database file for DuckDB targets, read the same way as [`DatabaseTarget::sqlite_path`].
    /// `duckdb://` and `duckdb:///:memory:` open an in-memory database.
    pub fn duckdb_path(&self) -> Option<PathBuf> {
        if self.dialect != Dialect::Duckdb {
            return None;
        }
        self.file_path("duckdb:")
    }

    fn file_path(&self, scheme: &str) -> Option<PathBuf> {
        let rest = strip_prefix_ignore_case(&self.url, scheme)?;
        let rest = rest.strip_prefix("//").unwrap_or(rest);
        let path = rest.split('?').next().unwrap_or_default();

        if path.is_empty() || path.trim_start_matches('/') == MEMORY {
            return None;
        }

        Some(PathBuf::from(path))
    }

    /// Database name and a URL to the server's maintenance database, for PostgreSQL targets.
    pub fn postgres_admin(&self) -> Option<(String, String)> {
        if self.dialect != Dialect::Postgres {
            return None;
        }

        let mut parsed = Url::parse(&self.url).ok()?;
        let name = database_name(&parsed)?;
        parsed.set_path("/postgres");

        Some((name, parsed.to_string()))
    }

    /// The URL with any password masked, for logs and console output.
    pub fn redacted(&self) -> String {
        match Url::parse(&self.url) {
            Ok(mut parsed) if parsed.password().is_some() => {
                if parsed.set_password(Some("****")).is_ok() {
                    parsed.to_string()
                } else {
                    self.url.clone()
                }
            }
            _ => self.url.clone(),
        }
    }
}

fn database_name(url: &Url) -> Option<String> {
    let name = url.path().trim_start_matches('/');
    if name.is_empty() { None } else { Some(name.to_string()) }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) { value.get(prefix.len()..) } else { None }
}
