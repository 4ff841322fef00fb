use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait,
    ColumnTrait,
    ConnectionTrait,
    EntityTrait,
    PaginatorTrait,
    QueryFilter,
    QueryOrder,
    Set,
};

use crate::db::entity::{ token_balance, TokenBalance };
use crate::error::{ Result, StoreError };

#[derive(Debug, Clone)]
pub struct NewTokenBalance {
    pub wallet_id: i32,
    pub token_address: String,
    pub token_symbol: String,
    pub balance: f64,
    pub usd_value: f64,
    pub last_updated: NaiveDateTime,
}

pub struct TokenBalanceRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> TokenBalanceRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: NewTokenBalance) -> Result<token_balance::Model> {
        let balance = token_balance::ActiveModel {
            wallet_id: Set(input.wallet_id),
            token_address: Set(input.token_address),
            token_symbol: Set(input.token_symbol),
            balance: Set(input.balance),
            usd_value: Set(input.usd_value),
            last_updated: Set(input.last_updated),
            created_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        };

        Ok(balance.insert(self.db).await?)
    }

    pub async fn find_by_token_address(&self, token_address: &str) -> Result<token_balance::Model> {
        TokenBalance::find()
            .filter(token_balance::Column::TokenAddress.eq(token_address))
            .one(self.db).await?
            .ok_or_else(|| StoreError::NotFound(format!("token balance {}", token_address)))
    }

    pub async fn find_by_wallet_id(&self, wallet_id: i32) -> Result<Vec<token_balance::Model>> {
        let balances = TokenBalance::find()
            .filter(token_balance::Column::WalletId.eq(wallet_id))
            .order_by_asc(token_balance::Column::TokenSymbol)
            .all(self.db).await?;

        Ok(balances)
    }

    pub async fn update_balance(
        &self,
        token_address: &str,
        balance: f64,
        usd_value: f64,
        last_updated: NaiveDateTime
    ) -> Result<token_balance::Model> {
        let existing = self.find_by_token_address(token_address).await?;

        let mut active: token_balance::ActiveModel = existing.into();
        active.balance = Set(balance);
        active.usd_value = Set(usd_value);
        active.last_updated = Set(last_updated);

        Ok(active.update(self.db).await?)
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(TokenBalance::find().count(self.db).await?)
    }
}
