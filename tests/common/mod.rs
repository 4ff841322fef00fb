#![allow(dead_code)]

use std::path::PathBuf;

use chrono::Utc;
use sea_orm::{ EntityTrait, PaginatorTrait };
use tempfile::TempDir;
use uuid::Uuid;
use wallet_store::db::{
    entity::{ TokenBalance, Transaction, Wallet },
    NewTokenBalance,
    NewTransaction,
    NewWallet,
    WalletRepository,
};
use wallet_store::{ setup_database, SessionContext, Settings, StoreError };

/// A throwaway database file (SQLite unless built with [`TestDatabase::duckdb`]) inside its
/// own temp directory.
pub struct TestDatabase {
    pub dir: TempDir,
    pub path: PathBuf,
    pub settings: Settings,
}

impl TestDatabase {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite");
        let settings = Settings::new(format!("sqlite://{}", path.display()));

        Self { dir, path, settings }
    }

    pub fn duckdb() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.duckdb");
        let settings = Settings::new(format!("duckdb://{}", path.display()));

        Self { dir, path, settings }
    }

    pub async fn with_schema() -> Self {
        let db = Self::new();
        setup_database(&db.settings).await.unwrap();
        db
    }

    pub async fn duckdb_with_schema() -> Self {
        let db = Self::duckdb();
        setup_database(&db.settings).await.unwrap();
        db
    }

    pub async fn context(&self) -> SessionContext {
        SessionContext::connect(self.settings.clone()).await.unwrap()
    }
}

/// Row counts for wallets, transactions and token balances, read in their own session.
pub async fn counts(context: &SessionContext) -> (u64, u64, u64) {
    context
        .with_session(|session| {
            Box::pin(async move {
                let wallets = Wallet::find().count(session).await?;
                let transactions = Transaction::find().count(session).await?;
                let balances = TokenBalance::find().count(session).await?;
                Ok::<_, StoreError>((wallets, transactions, balances))
            })
        }).await
        .unwrap()
}

pub async fn seed_wallet(context: &SessionContext) -> i32 {
    context
        .with_session(|session| {
            Box::pin(async move {
                let wallet = WalletRepository::new(session).create(new_wallet()).await?;
                Ok::<_, StoreError>(wallet.id)
            })
        }).await
        .unwrap()
}

pub fn new_wallet() -> NewWallet {
    NewWallet {
        address: Uuid::new_v4().to_string(),
        label: "Test".to_string(),
    }
}

pub fn new_transaction(wallet_id: i32, hash: &str) -> NewTransaction {
    NewTransaction {
        wallet_id,
        hash: hash.to_string(),
        from_address: Uuid::new_v4().to_string(),
        to_address: Uuid::new_v4().to_string(),
        value: 1.0,
        gas_used: 21_000,
        gas_price: 1.5,
        block_number: 19_000_000,
        block_timestamp: Utc::now().naive_utc(),
        chain_id: None,
    }
}

pub fn new_token_balance(wallet_id: i32, token_address: &str) -> NewTokenBalance {
    NewTokenBalance {
        wallet_id,
        token_address: token_address.to_string(),
        token_symbol: "TEST".to_string(),
        balance: 1.0,
        usd_value: 1.0,
        last_updated: Utc::now().naive_utc(),
    }
}
