mod common;

use std::time::Duration;

use common::{ counts, new_token_balance, new_transaction, new_wallet, seed_wallet, TestDatabase };
use sea_orm::ConnectionTrait;
use wallet_store::db::{ TokenBalanceRepository, TransactionRepository, WalletRepository };
use wallet_store::{ ConstraintKind, SessionContext, StoreError };

#[tokio::test]
async fn test_committed_rows_are_visible_to_a_fresh_context() {
    let db = TestDatabase::with_schema().await;
    let context = db.context().await;

    let hash = uuid::Uuid::new_v4().to_string();
    let token = uuid::Uuid::new_v4().to_string();
    context
        .with_session(|session| {
            Box::pin(async move {
                let wallet = WalletRepository::new(session).create(new_wallet()).await?;
                TransactionRepository::new(session).create(new_transaction(wallet.id, &hash)).await?;
                TokenBalanceRepository::new(session).create(
                    new_token_balance(wallet.id, &token)
                ).await?;
                Ok::<_, StoreError>(())
            })
        }).await
        .unwrap();
    context.close().await.unwrap();

    let fresh = db.context().await;
    assert_eq!(counts(&fresh).await, (1, 1, 1));
}

#[tokio::test]
async fn test_chain_id_defaults_to_one() {
    let db = TestDatabase::with_schema().await;
    let context = db.context().await;
    let wallet_id = seed_wallet(&context).await;

    let tx = context
        .with_session(|session| {
            Box::pin(async move {
                TransactionRepository::new(session).create(
                    new_transaction(wallet_id, "0xdefault")
                ).await
            })
        }).await
        .unwrap();

    assert_eq!(tx.chain_id, 1);
    assert_eq!(tx.wallet_id, wallet_id);
}

#[tokio::test]
async fn test_duplicate_hash_is_rejected_and_rolled_back() {
    let db = TestDatabase::with_schema().await;
    let context = db.context().await;
    let wallet_id = seed_wallet(&context).await;

    context
        .with_session(|session| {
            Box::pin(async move {
                TransactionRepository::new(session).create(
                    new_transaction(wallet_id, "0xabc")
                ).await
            })
        }).await
        .unwrap();
    assert_eq!(counts(&context).await, (1, 1, 0));

    let err = context
        .with_session(|session| {
            Box::pin(async move {
                WalletRepository::new(session).create(new_wallet()).await?;
                TransactionRepository::new(session).create(
                    new_transaction(wallet_id, "0xabc")
                ).await
            })
        }).await
        .unwrap_err();

    assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));
    assert_eq!(counts(&context).await, (1, 1, 0));
}

#[tokio::test]
async fn test_duplicate_token_address_is_rejected_and_rolled_back() {
    let db = TestDatabase::with_schema().await;
    let context = db.context().await;
    let first_wallet = seed_wallet(&context).await;
    let second_wallet = seed_wallet(&context).await;

    context
        .with_session(|session| {
            Box::pin(async move {
                TokenBalanceRepository::new(session).create(
                    new_token_balance(first_wallet, "0xtoken")
                ).await
            })
        }).await
        .unwrap();

    // Uniqueness is global, so a different wallet cannot track the same token either.
    let err = context
        .with_session(|session| {
            Box::pin(async move {
                TokenBalanceRepository::new(session).create(
                    new_token_balance(second_wallet, "0xtoken")
                ).await
            })
        }).await
        .unwrap_err();

    assert!(err.is_constraint_violation());
    assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));
    assert_eq!(counts(&context).await, (2, 0, 1));
}

#[tokio::test]
async fn test_failed_unit_of_work_leaves_no_rows() {
    let db = TestDatabase::with_schema().await;
    let context = db.context().await;

    let result: anyhow::Result<()> = context.with_session(|session| {
        Box::pin(async move {
            WalletRepository::new(session).create(new_wallet()).await?;
            anyhow::bail!("boom")
        })
    }).await;

    assert_eq!(result.unwrap_err().to_string(), "boom");
    context.close().await.unwrap();

    let fresh = db.context().await;
    assert_eq!(counts(&fresh).await, (0, 0, 0));
}

#[tokio::test]
async fn test_cancelled_unit_of_work_is_rolled_back() {
    let db = TestDatabase::with_schema().await;
    let context = SessionContext::connect(db.settings.clone().with_max_connections(1)).await.unwrap();

    let cancelled = tokio::time::timeout(
        Duration::from_millis(200),
        context.with_session(|session| {
            Box::pin(async move {
                WalletRepository::new(session).create(new_wallet()).await?;
                std::future::pending::<()>().await;
                Ok::<_, StoreError>(())
            })
        })
    ).await;
    assert!(cancelled.is_err());

    assert_eq!(counts(&context).await, (0, 0, 0));
}

#[tokio::test]
async fn test_foreign_keys_are_enforced() {
    let db = TestDatabase::with_schema().await;
    let context = db.context().await;

    let err = context
        .with_session(|session| {
            Box::pin(async move {
                TransactionRepository::new(session).create(new_transaction(9999, "0xorphan")).await
            })
        }).await
        .unwrap_err();
    assert_eq!(err.constraint_kind(), Some(ConstraintKind::ForeignKey));

    let wallet_id = seed_wallet(&context).await;
    context
        .with_session(|session| {
            Box::pin(async move {
                TransactionRepository::new(session).create(new_transaction(wallet_id, "0xkept")).await
            })
        }).await
        .unwrap();

    let err = context
        .with_session(|session| {
            Box::pin(async move { WalletRepository::new(session).delete(wallet_id).await })
        }).await
        .unwrap_err();
    assert_eq!(err.constraint_kind(), Some(ConstraintKind::ForeignKey));
    assert_eq!(counts(&context).await, (1, 1, 0));
}

#[tokio::test]
async fn test_constraint_violation_at_commit_is_rolled_back() {
    let db = TestDatabase::with_schema().await;
    let context = db.context().await;

    let err = context
        .with_session(|session| {
            Box::pin(async move {
                session.execute_unprepared("PRAGMA defer_foreign_keys = ON").await?;
                TransactionRepository::new(session).create(
                    new_transaction(9999, "0xdeferred")
                ).await?;
                Ok::<_, StoreError>(())
            })
        }).await
        .unwrap_err();

    assert_eq!(err.constraint_kind(), Some(ConstraintKind::ForeignKey));
    assert_eq!(counts(&context).await, (0, 0, 0));
}

#[tokio::test]
async fn test_rollback_failure_keeps_the_unit_of_work_error() {
    let db = TestDatabase::with_schema().await;
    let context = db.context().await;

    let result: anyhow::Result<()> = context.with_session(|session| {
        Box::pin(async move {
            WalletRepository::new(session).create(new_wallet()).await?;
            // Ends the transaction underneath the session, so the rollback that follows fails.
            session.execute_unprepared("COMMIT").await?;
            anyhow::bail!("boom")
        })
    }).await;

    assert_eq!(result.unwrap_err().to_string(), "boom");
    context.close().await.unwrap();

    let fresh = db.context().await;
    assert_eq!(counts(&fresh).await, (1, 0, 0));
}

#[tokio::test]
async fn test_repository_reads_and_updates() {
    let db = TestDatabase::with_schema().await;
    let context = db.context().await;
    let wallet_id = seed_wallet(&context).await;

    let (wallet, balance, history) = context
        .with_session(|session| {
            Box::pin(async move {
                let wallets = WalletRepository::new(session);
                let transactions = TransactionRepository::new(session);
                let balances = TokenBalanceRepository::new(session);

                let mut older = new_transaction(wallet_id, "0x01");
                older.block_number = 100;
                let mut newer = new_transaction(wallet_id, "0x02");
                newer.block_number = 200;
                newer.chain_id = Some(137);
                transactions.create(older).await?;
                transactions.create(newer).await?;

                balances.create(new_token_balance(wallet_id, "0xusdc")).await?;
                let updated_at = chrono::Utc::now().naive_utc();
                let balance = balances.update_balance("0xusdc", 42.0, 41.5, updated_at).await?;

                let wallet = wallets.update_label(wallet_id, "Cold storage".to_string()).await?;
                let history = transactions.find_by_wallet_id(wallet_id, Some(10), None).await?;

                Ok::<_, StoreError>((wallet, balance, history))
            })
        }).await
        .unwrap();

    assert_eq!(wallet.label, "Cold storage");
    assert_eq!(balance.balance, 42.0);
    assert_eq!(balance.usd_value, 41.5);

    let hashes: Vec<_> = history
        .iter()
        .map(|tx| tx.hash.as_str())
        .collect();
    assert_eq!(hashes, vec!["0x02", "0x01"]);
    assert_eq!(history[0].chain_id, 137);

    let found = WalletRepository::new(context.connection())
        .find_by_address(&wallet.address).await
        .unwrap();
    assert_eq!(found.len(), 1);

    let err = TransactionRepository::new(context.connection())
        .find_by_hash("0xmissing").await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}
