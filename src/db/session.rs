use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use lazy_static::lazy_static;
use sea_orm::{
    ConnectOptions,
    Database,
    DatabaseConnection,
    DatabaseTransaction,
    DbErr,
    TransactionTrait,
};
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::db::duckdb_engine::DuckDbEngine;
use crate::db::target::DatabaseTarget;
use crate::enums::Dialect;
use crate::error::{ Result, StoreError };

/// One unit of work: a single transaction on a single pooled connection.
///
/// On DuckDB there is one embedded connection and sessions take turns on it.
pub type Session = DatabaseTransaction;

lazy_static! {
    static ref GLOBAL_CONTEXT: Mutex<Option<Arc<SessionContext>>> = Mutex::new(None);
}

/// Owns the connection pool for one database and hands out scoped sessions.
///
/// Build one explicitly with [`SessionContext::connect`], or share a process-wide instance
/// through [`SessionContext::global`] / [`SessionContext::reset`].
#[derive(Debug)]
pub struct SessionContext {
    db: DatabaseConnection,
    duckdb: Option<DuckDbEngine>,
    target: DatabaseTarget,
    settings: Settings,
}

impl SessionContext {
    pub async fn connect(settings: Settings) -> Result<Self> {
        let target = DatabaseTarget::parse(&settings.db_url)?;
        let (db, duckdb) = open_engine(&settings, &target).await?;

        tracing::info!("Session context connected to {}", target.redacted());

        Ok(Self { db, duckdb, target, settings })
    }

    /// Shared instance, built from [`Settings::from_env`] on first use.
    ///
    /// Construction happens under a lock, so concurrent first callers still get one engine.
    pub async fn global() -> Result<Arc<SessionContext>> {
        let mut slot = GLOBAL_CONTEXT.lock().await;

        if let Some(context) = slot.as_ref() {
            return Ok(Arc::clone(context));
        }

        let settings = Settings::from_env()?;
        let context = Arc::new(SessionContext::connect(settings).await?);
        *slot = Some(Arc::clone(&context));

        Ok(context)
    }

    /// Forget the shared instance; the next [`SessionContext::global`] call connects again.
    pub async fn reset() {
        let previous = GLOBAL_CONTEXT.lock().await.take();

        let Some(context) = previous else {
            return;
        };

        match Arc::try_unwrap(context) {
            Ok(context) => {
                if let Err(e) = context.close().await {
                    tracing::warn!("Failed to close database pool on reset: {}", e);
                }
            }
            Err(_) => {
                tracing::debug!("Session context still in use; pool closes when the last handle drops");
            }
        }
    }

    pub async fn is_initialized() -> bool {
        GLOBAL_CONTEXT.lock().await.is_some()
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn target(&self) -> &DatabaseTarget {
        &self.target
    }

    pub fn dialect(&self) -> Dialect {
        self.target.dialect()
    }

    /// Run `unit_of_work` inside a fresh session.
    ///
    /// `Ok` commits, `Err` rolls back and returns the original error. The connection goes
    /// back to the pool on every path; dropping the returned future before it finishes
    /// rolls the open transaction back.
    pub async fn with_session<F, T, E>(&self, unit_of_work: F) -> std::result::Result<T, E>
        where
            F: for<'c> FnOnce(
                &'c Session
            ) -> Pin<Box<dyn Future<Output = std::result::Result<T, E>> + Send + 'c>> +
                Send,
            T: Send,
            E: From<StoreError> + std::fmt::Display + Send
    {
        let session = self.db.begin().await.map_err(StoreError::from)?;
        if let Some(e) = self.engine_failure() {
            drop(session);
            return Err(StoreError::from(e).into());
        }

        match unit_of_work(&session).await {
            Ok(value) => {
                session.commit().await.map_err(commit_failed)?;
                if let Some(e) = self.engine_failure() {
                    return Err(commit_failed(e).into());
                }
                Ok(value)
            }
            Err(err) => {
                tracing::debug!("Unit of work failed, rolling back: {}", err);
                if let Err(rollback_err) = session.rollback().await {
                    tracing::error!(
                        "{}; returning the unit of work error instead",
                        StoreError::Rollback(rollback_err)
                    );
                }
                Err(err)
            }
        }
    }

    // DuckDB begin and commit errors are parked on the engine instead of returned by sea-orm.
    fn engine_failure(&self) -> Option<DbErr> {
        self.duckdb.as_ref().and_then(DuckDbEngine::take_failure)
    }

    pub async fn close(self) -> Result<()> {
        self.db.close().await?;
        tracing::debug!("Closed database pool for {}", self.target.redacted());
        Ok(())
    }
}

fn commit_failed(err: DbErr) -> StoreError {
    let err = StoreError::from(err);
    tracing::warn!("Session commit failed: {}", err);
    err
}

/// Open a pool against `target` using the pool knobs in `settings`.
///
/// DuckDB has no pool: the embedded engine is opened directly and also returned, so sessions
/// can collect the transaction errors it parks.
pub(crate) async fn open_engine(
    settings: &Settings,
    target: &DatabaseTarget
) -> Result<(DatabaseConnection, Option<DuckDbEngine>)> {
    if target.dialect() == Dialect::Duckdb {
        let connect_error = |e: DbErr| {
            StoreError::Connection(format!("Failed to connect to {}: {}", target.redacted(), e))
        };
        let engine = DuckDbEngine::open(target.duckdb_path().as_deref(), settings.sql_logging).map_err(
            connect_error
        )?;
        let db = engine.connection().map_err(connect_error)?;
        return Ok((db, Some(engine)));
    }

    let mut options = ConnectOptions::new(target.connect_url());
    options.sqlx_logging(settings.sql_logging);

    if let Some(max) = settings.max_connections {
        options.max_connections(max);
    }
    if let Some(timeout) = settings.acquire_timeout {
        options.acquire_timeout(timeout);
    }

    let db = Database::connect(options).await.map_err(|e| {
        StoreError::Connection(format!("Failed to connect to {}: {}", target.redacted(), e))
    })?;

    Ok((db, None))
}
