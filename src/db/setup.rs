use std::ffi::OsString;
use std::path::{ Path, PathBuf };

use sea_orm::{ ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement };
use sea_orm_migration::SchemaManager;

use crate::config::Settings;
use crate::db::schema::{ TableSpec, TABLES };
use crate::db::session::open_engine;
use crate::db::target::DatabaseTarget;
use crate::enums::Dialect;
use crate::error::{ Result, StoreError };

const SQLITE_SIDE_FILES: [&str; 3] = ["-wal", "-shm", "-journal"];
const DUCKDB_SIDE_FILES: [&str; 1] = [".wal"];

/// Create every table that does not exist yet. Safe to call repeatedly.
pub async fn setup_database(settings: &Settings) -> Result<()> {
    let target = DatabaseTarget::parse(&settings.db_url)?;
    tracing::info!("Setting up database at {}", target.redacted());

    let (db, _) = open_engine(settings, &target).await?;
    let created = create_all(&db, target.dialect()).await;
    db.close().await?;
    created?;

    tracing::info!("Database schema ready ({} tables)", TABLES.len());
    Ok(())
}

/// Issue `CREATE TABLE IF NOT EXISTS` for each table, parents first.
///
/// On DuckDB each table's id sequence is created just before the table.
pub async fn create_all<C: ConnectionTrait>(db: &C, dialect: Dialect) -> Result<()> {
    for table in TABLES.iter() {
        tracing::debug!("Creating table {} if missing", table.name);
        for stmt in table.create_statements(dialect) {
            db.execute(stmt).await?;
        }
    }

    Ok(())
}

/// Destroy the database named by `db_url`. Missing databases are left alone.
///
/// Reset or close any open [`crate::db::SessionContext`] for the same database first.
pub async fn drop_database(settings: &Settings) -> Result<()> {
    let target = DatabaseTarget::parse(&settings.db_url)?;

    match target.dialect() {
        Dialect::Sqlite => drop_file(target.sqlite_path(), &SQLITE_SIDE_FILES),
        Dialect::Duckdb => drop_file(target.duckdb_path(), &DUCKDB_SIDE_FILES),
        Dialect::Postgres => drop_postgres(&target).await,
    }
}

fn drop_file(path: Option<PathBuf>, side_files: &[&str]) -> Result<()> {
    let Some(path) = path else {
        tracing::info!("In-memory database, nothing to drop");
        return Ok(());
    };

    if !path.exists() {
        tracing::info!("Database {} does not exist, nothing to drop", path.display());
        return Ok(());
    }

    std::fs::remove_file(&path)?;
    for suffix in side_files {
        let side_file = with_suffix(&path, suffix);
        if side_file.exists() {
            std::fs::remove_file(&side_file)?;
        }
    }

    tracing::info!("Dropped database {}", path.display());
    Ok(())
}

async fn drop_postgres(target: &DatabaseTarget) -> Result<()> {
    let (name, admin_url) = target
        .postgres_admin()
        .ok_or_else(|| StoreError::Connection("Database URL has no database name".to_string()))?;

    let admin = Database::connect(admin_url).await.map_err(|e| {
        StoreError::Connection(format!("Failed to connect to {}: {}", target.redacted(), e))
    })?;

    let sql = format!("DROP DATABASE IF EXISTS \"{}\"", name.replace('"', "\"\""));
    let dropped = admin.execute(Statement::from_string(DbBackend::Postgres, sql)).await;
    admin.close().await?;
    dropped?;

    tracing::info!("Dropped database {}", name);
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    name.into()
}

/// Tables and columns from the schema that the live database lacks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchemaInspection {
    pub missing_tables: Vec<&'static str>,
    pub missing_columns: Vec<(&'static str, &'static str)>,
}

impl SchemaInspection {
    pub fn is_complete(&self) -> bool {
        self.missing_tables.is_empty() && self.missing_columns.is_empty()
    }
}

/// Compare the live database against [`TABLES`].
///
/// DuckDB is read through `information_schema`; the other engines through `SchemaManager`.
pub async fn inspect_schema(db: &DatabaseConnection, dialect: Dialect) -> Result<SchemaInspection> {
    let mut inspection = SchemaInspection::default();

    if dialect == Dialect::Duckdb {
        for table in TABLES.iter() {
            inspect_duckdb_table(db, table, &mut inspection).await?;
        }
        return Ok(inspection);
    }

    let manager = SchemaManager::new(db);
    for table in TABLES.iter() {
        inspect_table(&manager, table, &mut inspection).await?;
    }

    Ok(inspection)
}

async fn inspect_duckdb_table(
    db: &DatabaseConnection,
    table: &TableSpec,
    inspection: &mut SchemaInspection
) -> Result<()> {
    let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT column_name FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = $1",
        [table.name.into()]
    );

    let mut present = Vec::new();
    for row in db.query_all(stmt).await? {
        present.push(row.try_get::<String>("", "column_name")?);
    }

    if present.is_empty() {
        inspection.missing_tables.push(table.name);
        return Ok(());
    }

    for column in table.column_names() {
        if !present.iter().any(|name| name == column) {
            inspection.missing_columns.push((table.name, column));
        }
    }

    Ok(())
}

async fn inspect_table(
    manager: &SchemaManager<'_>,
    table: &TableSpec,
    inspection: &mut SchemaInspection
) -> Result<()> {
    if !manager.has_table(table.name).await? {
        inspection.missing_tables.push(table.name);
        return Ok(());
    }

    for column in table.column_names() {
        if !manager.has_column(table.name, column).await? {
            inspection.missing_columns.push((table.name, column));
        }
    }

    Ok(())
}
