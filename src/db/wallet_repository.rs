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

use crate::db::entity::{ wallet, Wallet };
use crate::error::{ Result, StoreError };

#[derive(Debug, Clone)]
pub struct NewWallet {
    pub address: String,
    pub label: String,
}

pub struct WalletRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> WalletRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: NewWallet) -> Result<wallet::Model> {
        let wallet = wallet::ActiveModel {
            address: Set(input.address),
            label: Set(input.label),
            created_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        };

        let wallet = wallet.insert(self.db).await?;
        tracing::debug!("Created wallet {} ({})", wallet.id, wallet.address);
        Ok(wallet)
    }

    pub async fn find_by_id(&self, id: i32) -> Result<wallet::Model> {
        Wallet::find_by_id(id)
            .one(self.db).await?
            .ok_or_else(|| StoreError::NotFound(format!("wallet {}", id)))
    }

    /// Addresses are not unique, so every wallet with this address is returned, oldest first.
    pub async fn find_by_address(&self, address: &str) -> Result<Vec<wallet::Model>> {
        let wallets = Wallet::find()
            .filter(wallet::Column::Address.eq(address))
            .order_by_asc(wallet::Column::Id)
            .all(self.db).await?;

        Ok(wallets)
    }

    pub async fn update_label(&self, id: i32, label: String) -> Result<wallet::Model> {
        let wallet = self.find_by_id(id).await?;

        let mut active: wallet::ActiveModel = wallet.into();
        active.label = Set(label);

        Ok(active.update(self.db).await?)
    }

    /// Fails with a foreign-key violation while transactions or balances still reference it.
    pub async fn delete(&self, id: i32) -> Result<()> {
        let result = Wallet::delete_by_id(id).exec(self.db).await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(format!("wallet {}", id)));
        }
        Ok(())
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(Wallet::find().count(self.db).await?)
    }
}
