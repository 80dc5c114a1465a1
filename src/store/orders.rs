//! Order rows and their status transitions.
//!
//! Every mutation that competes with another writer goes through a row
//! lock or a conditional update, so status transitions serialize per
//! order and the global uniqueness of order numbers holds under
//! concurrent submissions.

use rust_decimal::Decimal;
use sqlx::PgPool;

use super::is_unique_violation;
use crate::models::{Order, OrderStatus};

#[derive(Debug, thiserror::Error)]
pub enum OrderStoreError {
    #[error("order already uploaded by this user")]
    AlreadyOwnedByUser,

    #[error("order already uploaded by another user")]
    OwnedByOtherUser,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct OrderStore {
    pool: PgPool,
}

impl OrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new order in status NEW, or reports who owns the number.
    ///
    /// The row matching the number is locked for the duration of the
    /// transaction; if the insert still loses a race on the unique index,
    /// the committed row decides ownership.
    pub async fn insert_order(
        &self,
        user_id: i64,
        number: &str,
    ) -> Result<i64, OrderStoreError> {
        let mut tx = self.pool.begin().await?;

        let owner: Option<(i64,)> =
            sqlx::query_as("SELECT user_id FROM orders WHERE order_number = $1 FOR UPDATE")
                .bind(number)
                .fetch_optional(&mut *tx)
                .await?;

        if let Some((owner_id,)) = owner {
            return Err(ownership_conflict(owner_id, user_id));
        }

        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO orders (user_id, order_number) VALUES ($1, $2) RETURNING id",
        )
        .bind(user_id)
        .bind(number)
        .fetch_one(&mut *tx)
        .await;

        match inserted {
            Ok(order_id) => {
                tx.commit().await?;
                Ok(order_id)
            }
            Err(err) if is_unique_violation(&err) => {
                drop(tx);
                // lost the race; the committed row decides ownership
                match self.find_by_number(number).await? {
                    Some((_, owner_id)) => Err(ownership_conflict(owner_id, user_id)),
                    None => Err(OrderStoreError::Database(err)),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_number(&self, number: &str) -> Result<Option<(i64, i64)>, sqlx::Error> {
        sqlx::query_as("SELECT id, user_id FROM orders WHERE order_number = $1")
            .bind(number)
            .fetch_optional(&self.pool)
            .await
    }

    /// Up to `limit` orders in status NEW, oldest first.
    pub async fn claim_pending(&self, limit: i64) -> Result<Vec<Order>, OrderStoreError> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, user_id, order_number, status, accrual, uploaded_at
            FROM orders
            WHERE status = 'NEW'
            ORDER BY uploaded_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Lease (NEW -> PROCESSING) and release (PROCESSING -> NEW)
    /// transitions. Returns whether the transition applied; `false` means
    /// another worker moved the row first. Terminal states only ever go
    /// through [`finalize`](Self::finalize).
    pub async fn update_status(
        &self,
        order_id: i64,
        status: OrderStatus,
    ) -> Result<bool, OrderStoreError> {
        let expected = match status {
            OrderStatus::Processing => OrderStatus::New,
            OrderStatus::New => OrderStatus::Processing,
            OrderStatus::Invalid | OrderStatus::Processed => return Ok(false),
        };

        let result = sqlx::query("UPDATE orders SET status = $1 WHERE id = $2 AND status = $3")
            .bind(status)
            .bind(order_id)
            .bind(expected)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Writes the terminal status and accrual together. A no-op when the
    /// order is already terminal, so duplicate deliveries from the
    /// reconciliation engine cannot overwrite a settled result.
    pub async fn finalize(
        &self,
        user_id: i64,
        number: &str,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<(), OrderStoreError> {
        debug_assert!(status.is_terminal());

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $1, accrual = $2
            WHERE user_id = $3
              AND order_number = $4
              AND status NOT IN ('INVALID', 'PROCESSED')
            "#,
        )
        .bind(status)
        .bind(accrual)
        .bind(user_id)
        .bind(number)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Looks up the order by (user, number), inserting a NEW row when
    /// absent. Returns the id and whether the row was created now. A
    /// number owned by another user is a conflict, never a second row.
    pub async fn get_or_create(
        &self,
        user_id: i64,
        number: &str,
    ) -> Result<(i64, bool), OrderStoreError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64, i64)> =
            sqlx::query_as("SELECT id, user_id FROM orders WHERE order_number = $1 FOR UPDATE")
                .bind(number)
                .fetch_optional(&mut *tx)
                .await?;

        if let Some((order_id, owner_id)) = existing {
            return if owner_id == user_id {
                tx.commit().await?;
                Ok((order_id, false))
            } else {
                Err(OrderStoreError::OwnedByOtherUser)
            };
        }

        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO orders (user_id, order_number) VALUES ($1, $2) RETURNING id",
        )
        .bind(user_id)
        .bind(number)
        .fetch_one(&mut *tx)
        .await;

        match inserted {
            Ok(order_id) => {
                tx.commit().await?;
                Ok((order_id, true))
            }
            Err(err) if is_unique_violation(&err) => {
                drop(tx);
                match self.find_by_number(number).await? {
                    Some((order_id, owner_id)) if owner_id == user_id => Ok((order_id, false)),
                    Some(_) => Err(OrderStoreError::OwnedByOtherUser),
                    None => Err(OrderStoreError::Database(err)),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// The user's orders, newest upload first.
    pub async fn list_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, OrderStoreError> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, user_id, order_number, status, accrual, uploaded_at
            FROM orders
            WHERE user_id = $1
            ORDER BY uploaded_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }
}

fn ownership_conflict(owner_id: i64, user_id: i64) -> OrderStoreError {
    if owner_id == user_id {
        OrderStoreError::AlreadyOwnedByUser
    } else {
        OrderStoreError::OwnedByOtherUser
    }
}
