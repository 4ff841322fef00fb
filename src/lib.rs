pub mod config;
pub mod enums;
pub mod error;
pub mod db;

pub use config::Settings;
pub use enums::Dialect;
pub use error::{ ConstraintKind, Result, StoreError };
pub use db::{ drop_database, setup_database, Session, SessionContext };
