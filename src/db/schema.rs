//! Engine-independent description of the wallet tables.
//!
//! Each table is plain data: a name plus ordered column specs. [`TableSpec::create_statement`]
//! turns a spec into a `sea_query` statement that any supported backend can render, so the
//! same definitions materialise on SQLite, PostgreSQL and DuckDB. DuckDB has no auto-increment
//! columns; there `id` draws from a per-table sequence instead.
//!
//! Foreign keys use the engines' default `NO ACTION`: a parent row that still has children
//! cannot be deleted.

use sea_orm::sea_query::{ Alias, ColumnDef, Expr, ForeignKey, Table, TableCreateStatement };
use sea_orm::{ DbBackend, Statement };

use crate::enums::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    BigInteger,
    Double,
    Text,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    CurrentTimestamp,
    Integer(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKeySpec {
    pub table: &'static str,
    pub column: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub default: Option<ColumnDefault>,
    pub references: Option<ForeignKeySpec>,
}

impl ColumnSpec {
    /// A required (NOT NULL) column with no default.
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            nullable: false,
            primary_key: false,
            unique: false,
            default: None,
            references: None,
        }
    }

    /// Integer surrogate key, generated by the engine.
    pub const fn id() -> Self {
        let mut spec = Self::new("id", ColumnType::Integer);
        spec.primary_key = true;
        spec
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn default_value(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub const fn references(mut self, table: &'static str, column: &'static str) -> Self {
        self.references = Some(ForeignKeySpec { table, column });
        self
    }

    fn column_def(&self, id_sequence: Option<&str>) -> ColumnDef {
        let mut def = ColumnDef::new(Alias::new(self.name));

        match self.column_type {
            ColumnType::Integer => {
                def.integer();
            }
            ColumnType::BigInteger => {
                def.big_integer();
            }
            ColumnType::Double => {
                def.double();
            }
            ColumnType::Text => {
                def.string();
            }
            ColumnType::Timestamp => {
                def.date_time();
            }
        }

        if self.nullable {
            def.null();
        } else {
            def.not_null();
        }

        match (self.primary_key, id_sequence) {
            (true, Some(sequence)) => {
                def.primary_key().default(Expr::cust(format!("nextval('{}')", sequence)));
            }
            (true, None) => {
                def.auto_increment().primary_key();
            }
            (false, _) => {}
        }

        if self.unique {
            def.unique_key();
        }

        match self.default {
            Some(ColumnDefault::CurrentTimestamp) => {
                def.default(Expr::current_timestamp());
            }
            Some(ColumnDefault::Integer(value)) => {
                def.default(value);
            }
            None => {}
        }

        def
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
}

impl TableSpec {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    pub fn unique_columns(&self) -> impl Iterator<Item = &ColumnSpec> + '_ {
        self.columns.iter().filter(|c| c.unique)
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = (&'static str, ForeignKeySpec)> + '_ {
        self.columns.iter().filter_map(|c| c.references.map(|fk| (c.name, fk)))
    }

    /// Sequence feeding `id` on DuckDB, e.g. `wallets_id_seq`.
    pub fn id_sequence(&self) -> String {
        format!("{}_id_seq", self.name)
    }

    /// `CREATE TABLE IF NOT EXISTS` for this table, not yet bound to a backend.
    pub fn create_statement(&self) -> TableCreateStatement {
        self.build_create(None)
    }

    /// Same table, but `id` defaults to `nextval` of [`TableSpec::id_sequence`].
    pub fn create_statement_with_sequence(&self) -> TableCreateStatement {
        self.build_create(Some(&self.id_sequence()))
    }

    /// Every statement that materialises this table on `dialect`, in execution order.
    pub fn create_statements(&self, dialect: Dialect) -> Vec<Statement> {
        match dialect {
            Dialect::Duckdb => {
                let sequence = format!("CREATE SEQUENCE IF NOT EXISTS {}", self.id_sequence());
                vec![
                    Statement::from_string(DbBackend::Postgres, sequence),
                    DbBackend::Postgres.build(&self.create_statement_with_sequence())
                ]
            }
            Dialect::Sqlite | Dialect::Postgres => {
                vec![dialect.backend().build(&self.create_statement())]
            }
        }
    }

    fn build_create(&self, id_sequence: Option<&str>) -> TableCreateStatement {
        let mut stmt = Table::create();
        stmt.table(Alias::new(self.name)).if_not_exists();

        for column in self.columns {
            stmt.col(&mut column.column_def(id_sequence));
        }

        for (column, fk) in self.foreign_keys() {
            stmt.foreign_key(
                ForeignKey::create()
                    .name(format!("fk_{}_{}", self.name, column))
                    .from(Alias::new(self.name), Alias::new(column))
                    .to(Alias::new(fk.table), Alias::new(fk.column))
            );
        }

        stmt
    }
}

pub const WALLETS: TableSpec = TableSpec {
    name: "wallets",
    columns: &[
        ColumnSpec::id(),
        ColumnSpec::new("address", ColumnType::Text),
        ColumnSpec::new("label", ColumnType::Text),
        ColumnSpec::new("created_at", ColumnType::Timestamp).default_value(
            ColumnDefault::CurrentTimestamp
        ),
    ],
};

pub const TRANSACTIONS: TableSpec = TableSpec {
    name: "transactions",
    columns: &[
        ColumnSpec::id(),
        ColumnSpec::new("wallet_id", ColumnType::Integer).references("wallets", "id"),
        ColumnSpec::new("hash", ColumnType::Text).unique(),
        ColumnSpec::new("from_address", ColumnType::Text),
        ColumnSpec::new("to_address", ColumnType::Text),
        ColumnSpec::new("value", ColumnType::Double),
        ColumnSpec::new("gas_used", ColumnType::BigInteger),
        ColumnSpec::new("gas_price", ColumnType::Double),
        ColumnSpec::new("block_number", ColumnType::BigInteger),
        ColumnSpec::new("block_timestamp", ColumnType::Timestamp),
        ColumnSpec::new("chain_id", ColumnType::Integer).default_value(ColumnDefault::Integer(1)),
        ColumnSpec::new("created_at", ColumnType::Timestamp).default_value(
            ColumnDefault::CurrentTimestamp
        ),
    ],
};

// token_address is unique across all wallets, so one token can only be tracked for one wallet.
pub const TOKEN_BALANCES: TableSpec = TableSpec {
    name: "token_balances",
    columns: &[
        ColumnSpec::id(),
        ColumnSpec::new("wallet_id", ColumnType::Integer).references("wallets", "id"),
        ColumnSpec::new("token_address", ColumnType::Text).unique(),
        ColumnSpec::new("token_symbol", ColumnType::Text),
        ColumnSpec::new("balance", ColumnType::Double),
        ColumnSpec::new("usd_value", ColumnType::Double),
        ColumnSpec::new("last_updated", ColumnType::Timestamp),
        ColumnSpec::new("created_at", ColumnType::Timestamp).default_value(
            ColumnDefault::CurrentTimestamp
        ),
    ],
};

/// All tables, parents before children.
pub const TABLES: [TableSpec; 3] = [WALLETS, TRANSACTIONS, TOKEN_BALANCES];
