use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use ajopool_core::errors::{EngineError, EngineResult};
use ajopool_core::storage::Ledger;

fn db_err(err: sqlx::Error) -> EngineError {
    EngineError::Storage(err.into())
}

/// Wallet ledger over a `wallets` table. Debits lock the wallet row so the
/// balance check and the adjustment commit as one unit.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn balance(&self, user_id: Uuid) -> EngineResult<Decimal> {
        let row = sqlx::query("SELECT balance FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => row.try_get("balance").map_err(db_err),
            None => Ok(Decimal::ZERO),
        }
    }

    async fn debit(&self, user_id: Uuid, amount: Decimal) -> EngineResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query("SELECT balance FROM wallets WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        let available: Decimal = match row {
            Some(row) => row.try_get("balance").map_err(db_err)?,
            None => Decimal::ZERO,
        };
        if available < amount {
            return Err(EngineError::InsufficientBalance {
                required: amount,
                available,
            });
        }

        sqlx::query("UPDATE wallets SET balance = balance - $2, updated_at = $3 WHERE user_id = $1")
            .bind(user_id)
            .bind(amount)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }

    async fn credit(&self, user_id: Uuid, amount: Decimal) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets (user_id, balance, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET balance = wallets.balance + EXCLUDED.balance, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
