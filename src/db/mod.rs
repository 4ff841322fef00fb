pub mod entity;
pub use entity::*;

pub mod duckdb_engine;
pub mod schema;
pub mod session;
pub mod setup;
pub mod target;

pub use schema::{ ColumnDefault, ColumnSpec, ColumnType, ForeignKeySpec, TableSpec, TABLES };
pub use session::{ Session, SessionContext };
pub use setup::{
    create_all,
    drop_database,
    inspect_schema,
    setup_database,
    SchemaInspection,
};
pub use target::DatabaseTarget;
pub use duckdb_engine::DuckDbEngine;

mod wallet_repository;
pub use wallet_repository::{ NewWallet, WalletRepository };

mod transaction_repository;
pub use transaction_repository::{ NewTransaction, TransactionRepository };

mod token_balance_repository;
pub use token_balance_repository::{ NewTokenBalance, TokenBalanceRepository };
