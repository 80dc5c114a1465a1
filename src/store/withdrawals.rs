//! Append-only withdrawal ledger.

use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::models::Withdrawal;

#[derive(Debug, thiserror::Error)]
pub enum WithdrawalStoreError {
    #[error("not enough balance")]
    InsufficientBalance,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct WithdrawalStore {
    pool: PgPool,
}

impl WithdrawalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends a withdrawal after checking the balance, all in one
    /// transaction. The user row is locked first, so concurrent debits by
    /// the same user serialize and the balance can never go negative.
    pub async fn debit_with_balance_check(
        &self,
        user_id: i64,
        number: &str,
        sum: Decimal,
    ) -> Result<(), WithdrawalStoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        let balance: Decimal =
            sqlx::query_scalar("SELECT current_balance FROM user_balance WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;

        if balance < sum {
            return Err(WithdrawalStoreError::InsufficientBalance);
        }

        sqlx::query("INSERT INTO withdrawals (user_id, order_number, sum) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(number)
            .bind(sum)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// The user's withdrawals, most recent first.
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<Withdrawal>, sqlx::Error> {
        sqlx::query_as::<_, Withdrawal>(
            r#"
            SELECT id, user_id, order_number, sum, processed_at
            FROM withdrawals
            WHERE user_id = $1
            ORDER BY processed_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}
