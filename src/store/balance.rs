use sqlx::PgPool;

use crate::models::UserBalance;

/// Read-only view over accrued and withdrawn totals per user.
#[derive(Clone)]
pub struct BalanceStore {
    pool: PgPool,
}

impl BalanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: i64) -> Result<UserBalance, sqlx::Error> {
        sqlx::query_as::<_, UserBalance>(
            r#"
            SELECT user_id, total_accrued, total_withdrawn, current_balance
            FROM user_balance
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }
}
