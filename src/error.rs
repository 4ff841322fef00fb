use std::fmt;

use sea_orm::{ DbErr, SqlErr };
use thiserror::Error;

/// Which relational constraint the engine refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::NotNull => "not null",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Configuration error: {0}")] Configuration(String),

    #[error("Connection error: {0}")] Connection(String),

    #[error("{kind} constraint violated: {message}")] ConstraintViolation {
        kind: ConstraintKind,
        message: String,
    },

    #[error("Rollback failed: {0}")] Rollback(DbErr),

    #[error("Not found: {0}")] NotFound(String),

    #[error("Database error: {0}")] Database(DbErr),

    #[error("IO error: {0}")] Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation { .. })
    }

    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            StoreError::ConstraintViolation { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(message)) => {
                return StoreError::ConstraintViolation {
                    kind: ConstraintKind::Unique,
                    message,
                };
            }
            Some(SqlErr::ForeignKeyConstraintViolation(message)) => {
                return StoreError::ConstraintViolation {
                    kind: ConstraintKind::ForeignKey,
                    message,
                };
            }
            _ => {}
        }

        let message = err.to_string();
        if let Some(kind) = constraint_from_message(&message) {
            return StoreError::ConstraintViolation { kind, message };
        }

        match err {
            DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => StoreError::Connection(message),
            other => StoreError::Database(other),
        }
    }
}

// Failures that reach us without a sqlx error kind: SQLite RESTRICT triggers (code 1811),
// not-null failures on every engine, and everything DuckDB reports.
fn constraint_from_message(message: &str) -> Option<ConstraintKind> {
    let lower = message.to_lowercase();

    if
        lower.contains("foreign key constraint failed") ||
        lower.contains("violates foreign key constraint")
    {
        Some(ConstraintKind::ForeignKey)
    } else if
        lower.contains("not null constraint failed") ||
        (lower.contains("null value in column") && lower.contains("not-null constraint"))
    {
        Some(ConstraintKind::NotNull)
    } else if
        lower.contains("violates unique constraint") ||
        lower.contains("violates primary key constraint") ||
        lower.contains("unique constraint failed")
    {
        Some(ConstraintKind::Unique)
    } else {
        None
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::RuntimeErr;

    #[test]
    fn test_not_null_messages_are_classified() {
        let err = DbErr::Exec(
            RuntimeErr::Internal("NOT NULL constraint failed: wallets.label".to_string())
        );
        let store_err = StoreError::from(err);

        assert_eq!(store_err.constraint_kind(), Some(ConstraintKind::NotNull));
    }

    #[test]
    fn test_foreign_key_messages_are_classified() {
        let sqlite = DbErr::Exec(RuntimeErr::Internal("FOREIGN KEY constraint failed".to_string()));
        assert_eq!(StoreError::from(sqlite).constraint_kind(), Some(ConstraintKind::ForeignKey));

        let postgres = DbErr::Exec(
            RuntimeErr::Internal(
                "update or delete on table \"wallets\" violates foreign key constraint \"fk_transactions_wallet_id\"".to_string()
            )
        );
        assert_eq!(StoreError::from(postgres).constraint_kind(), Some(ConstraintKind::ForeignKey));

        let duckdb = DbErr::Query(
            RuntimeErr::Internal(
                "Constraint Error: Violates foreign key constraint because key \"id: 7\" does not exist in the referenced table".to_string()
            )
        );
        assert_eq!(StoreError::from(duckdb).constraint_kind(), Some(ConstraintKind::ForeignKey));
    }

    #[test]
    fn test_duckdb_duplicate_keys_are_unique_violations() {
        let err = DbErr::Query(
            RuntimeErr::Internal(
                "Constraint Error: Duplicate key \"hash: 0xabc\" violates unique constraint.".to_string()
            )
        );

        assert_eq!(StoreError::from(err).constraint_kind(), Some(ConstraintKind::Unique));
    }

    #[test]
    fn test_other_errors_stay_database_errors() {
        let err = DbErr::Custom("something odd".to_string());
        let store_err = StoreError::from(err);

        assert!(matches!(store_err, StoreError::Database(_)));
        assert!(!store_err.is_constraint_violation());
    }

    #[test]
    fn test_constraint_display_names_the_kind() {
        let err = StoreError::ConstraintViolation {
            kind: ConstraintKind::Unique,
            message: "transactions.hash".to_string(),
        };

        assert_eq!(err.to_string(), "unique constraint violated: transactions.hash");
    }
}
