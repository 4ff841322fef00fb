//! DuckDB behind sea-orm's proxy connection.
//!
//! DuckDB reads the PostgreSQL dialect, so statements are rendered with the Postgres builder and
//! executed here on one embedded connection. Every call runs on the blocking pool. Sessions are
//! serialised: `begin` takes the single session permit and `commit` / `rollback` hand it back.
//! Statements issued outside a session while another session is open join that transaction.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{ Arc, Mutex };

use async_trait::async_trait;
use chrono::{ DateTime, NaiveDateTime };
use duckdb::types::{ TimeUnit, Value as DuckValue };
use duckdb::Connection;
use sea_orm::sea_query::Value;
use sea_orm::{
    DatabaseConnection,
    DbBackend,
    DbErr,
    ProxyDatabaseTrait,
    ProxyExecResult,
    ProxyRow,
    RuntimeErr,
    Statement,
};
use tokio::sync::{ OwnedSemaphorePermit, Semaphore };

/// Shared handle to one DuckDB database. Clones talk to the same connection.
#[derive(Clone)]
pub struct DuckDbEngine {
    conn: Arc<Mutex<Connection>>,
    sessions: Arc<Semaphore>,
    permit: Arc<Mutex<Option<OwnedSemaphorePermit>>>,
    failure: Arc<Mutex<Option<DbErr>>>,
    log_statements: bool,
}

impl fmt::Debug for DuckDbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuckDbEngine")
            .field("sessions_available", &self.sessions.available_permits())
            .finish_non_exhaustive()
    }
}

impl DuckDbEngine {
    /// Open (or create) the database file, or an in-memory database when `path` is `None`.
    pub fn open(path: Option<&Path>, log_statements: bool) -> Result<Self, DbErr> {
        let conn = match path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }.map_err(|e| DbErr::Conn(RuntimeErr::Internal(e.to_string())))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            sessions: Arc::new(Semaphore::new(1)),
            permit: Arc::new(Mutex::new(None)),
            failure: Arc::new(Mutex::new(None)),
            log_statements,
        })
    }

    /// A sea-orm connection whose statements run on this engine.
    pub fn connection(&self) -> Result<DatabaseConnection, DbErr> {
        let proxy: Box<dyn ProxyDatabaseTrait> = Box::new(self.clone());
        sea_orm::ProxyDatabaseConnector::connect(DbBackend::Postgres, Arc::new(proxy))
    }

    /// The error raised by the last `BEGIN` or `COMMIT`, if it failed.
    ///
    /// sea-orm's proxy transactions cannot report these, so the session layer collects them here.
    pub fn take_failure(&self) -> Option<DbErr> {
        self.failure.lock().ok().and_then(|mut slot| slot.take())
    }

    async fn run<T, F>(&self, work: F) -> Result<T, DbErr>
        where T: Send + 'static, F: FnOnce(&Connection) -> Result<T, DbErr> + Send + 'static
    {
        let conn = Arc::clone(&self.conn);

        tokio::task
            ::spawn_blocking(move || {
                let conn = conn
                    .lock()
                    .map_err(|_| DbErr::Custom("DuckDB connection lock poisoned".to_string()))?;
                work(&conn)
            }).await
            .map_err(|e| DbErr::Custom(format!("DuckDB worker failed: {}", e)))?
    }

    async fn control(&self, sql: &'static str) -> Result<(), DbErr> {
        self.run(move |conn| conn.execute_batch(sql).map_err(exec_err)).await
    }

    fn record_failure(&self, err: DbErr) {
        if let Ok(mut slot) = self.failure.lock() {
            *slot = Some(err);
        }
    }

    fn hold_permit(&self, permit: Option<OwnedSemaphorePermit>) {
        if let Ok(mut slot) = self.permit.lock() {
            *slot = permit;
        }
    }

    fn log(&self, statement: &Statement) {
        if self.log_statements {
            tracing::info!("{}", statement);
        }
    }
}

#[async_trait]
impl ProxyDatabaseTrait for DuckDbEngine {
    async fn query(&self, statement: Statement) -> Result<Vec<ProxyRow>, DbErr> {
        self.log(&statement);
        let (sql, params) = prepare(statement)?;

        let rows = self.run(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(query_err)?;
            let mut rows = stmt.query(duckdb::params_from_iter(params)).map_err(query_err)?;
            let columns = rows
                .as_ref()
                .map(|stmt| stmt.column_names())
                .unwrap_or_default();

            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(query_err)? {
                let mut values = Vec::with_capacity(columns.len());
                for (index, name) in columns.iter().enumerate() {
                    let value: DuckValue = row.get(index).map_err(query_err)?;
                    values.push((name.clone(), value));
                }
                out.push(values);
            }
            Ok(out)
        }).await?;

        rows.into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(name, value)| Ok((name, from_duckdb(value)?)))
                    .collect::<Result<BTreeMap<_, _>, DbErr>>()
                    .map(ProxyRow::new)
            })
            .collect()
    }

    async fn execute(&self, statement: Statement) -> Result<ProxyExecResult, DbErr> {
        self.log(&statement);
        let (sql, params) = prepare(statement)?;

        let affected = self.run(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(exec_err)?;
            stmt.execute(duckdb::params_from_iter(params)).map_err(exec_err)
        }).await?;

        Ok(ProxyExecResult::new(0, affected as u64))
    }

    async fn begin(&self) {
        match Arc::clone(&self.sessions).acquire_owned().await {
            Ok(permit) => self.hold_permit(Some(permit)),
            Err(e) => {
                self.record_failure(DbErr::Custom(format!("DuckDB session slot closed: {}", e)));
                return;
            }
        }

        if let Err(e) = self.control("BEGIN TRANSACTION").await {
            tracing::warn!("DuckDB failed to begin a transaction: {}", e);
            self.record_failure(e);
        }
    }

    async fn commit(&self) {
        if let Err(e) = self.control("COMMIT").await {
            tracing::warn!("DuckDB commit failed: {}", e);
            if let Err(rollback_err) = self.control("ROLLBACK").await {
                tracing::debug!("DuckDB rollback after failed commit: {}", rollback_err);
            }
            self.record_failure(e);
        }
        self.hold_permit(None);
    }

    async fn rollback(&self) {
        if let Err(e) = self.control("ROLLBACK").await {
            tracing::error!("DuckDB rollback failed: {}", e);
        }
        self.hold_permit(None);
    }

    // Runs from `Drop` when a session is abandoned, so it cannot go through the blocking pool.
    fn start_rollback(&self) {
        match self.conn.lock() {
            Ok(conn) => {
                if let Err(e) = conn.execute_batch("ROLLBACK") {
                    tracing::warn!("DuckDB rollback of abandoned session failed: {}", e);
                }
            }
            Err(_) => tracing::error!("DuckDB connection lock poisoned; abandoned session not rolled back"),
        }
        self.hold_permit(None);
    }

    async fn ping(&self) -> Result<(), DbErr> {
        self.control("SELECT 1").await
    }
}

fn prepare(statement: Statement) -> Result<(String, Vec<DuckValue>), DbErr> {
    let params = statement.values
        .map(|values| values.0)
        .unwrap_or_default()
        .into_iter()
        .map(to_duckdb)
        .collect::<Result<Vec<_>, _>>()?;

    Ok((statement.sql, params))
}

fn exec_err(err: duckdb::Error) -> DbErr {
    DbErr::Exec(RuntimeErr::Internal(err.to_string()))
}

fn query_err(err: duckdb::Error) -> DbErr {
    DbErr::Query(RuntimeErr::Internal(err.to_string()))
}

fn to_duckdb(value: Value) -> Result<DuckValue, DbErr> {
    let value = match value {
        Value::Bool(v) => v.map_or(DuckValue::Null, DuckValue::Boolean),
        Value::TinyInt(v) => v.map_or(DuckValue::Null, DuckValue::TinyInt),
        Value::SmallInt(v) => v.map_or(DuckValue::Null, DuckValue::SmallInt),
        Value::Int(v) => v.map_or(DuckValue::Null, DuckValue::Int),
        Value::BigInt(v) => v.map_or(DuckValue::Null, DuckValue::BigInt),
        Value::TinyUnsigned(v) => v.map_or(DuckValue::Null, DuckValue::UTinyInt),
        Value::SmallUnsigned(v) => v.map_or(DuckValue::Null, DuckValue::USmallInt),
        Value::Unsigned(v) => v.map_or(DuckValue::Null, DuckValue::UInt),
        Value::BigUnsigned(v) => v.map_or(DuckValue::Null, DuckValue::UBigInt),
        Value::Float(v) => v.map_or(DuckValue::Null, DuckValue::Float),
        Value::Double(v) => v.map_or(DuckValue::Null, DuckValue::Double),
        Value::String(v) => v.map_or(DuckValue::Null, |v| DuckValue::Text(*v)),
        Value::Char(v) => v.map_or(DuckValue::Null, |v| DuckValue::Text(v.to_string())),
        Value::Bytes(v) => v.map_or(DuckValue::Null, |v| DuckValue::Blob(*v)),
        Value::ChronoDateTime(v) =>
            v.map_or(DuckValue::Null, |v| {
                DuckValue::Timestamp(TimeUnit::Microsecond, v.and_utc().timestamp_micros())
            }),
        Value::ChronoDateTimeUtc(v) =>
            v.map_or(DuckValue::Null, |v| {
                DuckValue::Timestamp(TimeUnit::Microsecond, v.timestamp_micros())
            }),
        other => {
            return Err(DbErr::Type(format!("Unsupported DuckDB parameter: {:?}", other)));
        }
    };

    Ok(value)
}

fn from_duckdb(value: DuckValue) -> Result<Value, DbErr> {
    let value = match value {
        DuckValue::Null => Value::String(None),
        DuckValue::Boolean(v) => Value::Bool(Some(v)),
        DuckValue::TinyInt(v) => Value::TinyInt(Some(v)),
        DuckValue::SmallInt(v) => Value::SmallInt(Some(v)),
        DuckValue::Int(v) => Value::Int(Some(v)),
        DuckValue::BigInt(v) => Value::BigInt(Some(v)),
        DuckValue::HugeInt(v) => {
            let v = i64::try_from(v).map_err(|_| DbErr::Type(format!("HUGEINT {} overflows i64", v)))?;
            Value::BigInt(Some(v))
        }
        DuckValue::UTinyInt(v) => Value::TinyUnsigned(Some(v)),
        DuckValue::USmallInt(v) => Value::SmallUnsigned(Some(v)),
        DuckValue::UInt(v) => Value::Unsigned(Some(v)),
        DuckValue::UBigInt(v) => Value::BigUnsigned(Some(v)),
        DuckValue::Float(v) => Value::Float(Some(v)),
        DuckValue::Double(v) => Value::Double(Some(v)),
        DuckValue::Text(v) => Value::String(Some(Box::new(v))),
        DuckValue::Blob(v) => Value::Bytes(Some(Box::new(v))),
        DuckValue::Timestamp(unit, v) => Value::ChronoDateTime(Some(Box::new(timestamp(unit, v)?))),
        other => {
            return Err(DbErr::Type(format!("Unsupported DuckDB value: {:?}", other)));
        }
    };

    Ok(value)
}

fn timestamp(unit: TimeUnit, value: i64) -> Result<NaiveDateTime, DbErr> {
    let micros = match unit {
        TimeUnit::Second => value.checked_mul(1_000_000),
        TimeUnit::Millisecond => value.checked_mul(1_000),
        TimeUnit::Microsecond => Some(value),
        TimeUnit::Nanosecond => Some(value / 1_000),
    };

    micros
        .and_then(DateTime::from_timestamp_micros)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| DbErr::Type(format!("Timestamp out of range: {}", value)))
}
