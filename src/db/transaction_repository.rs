use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue,
    ColumnTrait,
    ConnectionTrait,
    EntityTrait,
    PaginatorTrait,
    QueryFilter,
    QueryOrder,
    QuerySelect,
    Set,
};

use crate::db::entity::{ transaction, Transaction };
use crate::error::{ Result, StoreError };

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub wallet_id: i32,
    pub hash: String,
    pub from_address: String,
    pub to_address: String,
    pub value: f64,
    pub gas_used: i64,
    pub gas_price: f64,
    pub block_number: i64,
    pub block_timestamp: NaiveDateTime,
    /// Left to the column default (1) when `None`.
    pub chain_id: Option<i32>,
}

pub struct TransactionRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> TransactionRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: NewTransaction) -> Result<transaction::Model> {
        let chain_id = match input.chain_id {
            Some(chain_id) => Set(chain_id),
            None => ActiveValue::NotSet,
        };

        let transaction_model = transaction::ActiveModel {
            wallet_id: Set(input.wallet_id),
            hash: Set(input.hash),
            from_address: Set(input.from_address),
            to_address: Set(input.to_address),
            value: Set(input.value),
            gas_used: Set(input.gas_used),
            gas_price: Set(input.gas_price),
            block_number: Set(input.block_number),
            block_timestamp: Set(input.block_timestamp),
            chain_id,
            created_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        };

        Ok(transaction_model.insert(self.db).await?)
    }

    pub async fn find_by_hash(&self, hash: &str) -> Result<transaction::Model> {
        Transaction::find()
            .filter(transaction::Column::Hash.eq(hash))
            .one(self.db).await?
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", hash)))
    }

    /// Newest blocks first.
    pub async fn find_by_wallet_id(
        &self,
        wallet_id: i32,
        limit: Option<u64>,
        offset: Option<u64>
    ) -> Result<Vec<transaction::Model>> {
        let transactions = Transaction::find()
            .filter(transaction::Column::WalletId.eq(wallet_id))
            .order_by_desc(transaction::Column::BlockNumber)
            .order_by_desc(transaction::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(self.db).await?;

        Ok(transactions)
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(Transaction::find().count(self.db).await?)
    }
}
