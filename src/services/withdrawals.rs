//! Debits against the accrued balance.

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::luhn;
use crate::models::Withdrawal;
use crate::store::{OrderStore, OrderStoreError, WithdrawalStore, WithdrawalStoreError};

#[derive(Debug, thiserror::Error)]
pub enum WithdrawalServiceError {
    #[error("order number failed the checksum")]
    BadOrderNumber,

    #[error("withdrawal sum must be positive")]
    BadSum,

    #[error("not enough balance")]
    NotEnoughBalance,

    #[error("storage failure: {0}")]
    Storage(#[source] sqlx::Error),
}

#[derive(Clone)]
pub struct WithdrawalService {
    orders: OrderStore,
    withdrawals: WithdrawalStore,
}

impl WithdrawalService {
    pub fn new(orders: OrderStore, withdrawals: WithdrawalStore) -> Self {
        Self {
            orders,
            withdrawals,
        }
    }

    /// Debits `sum` points from the user against `number`. The number is
    /// revalidated here even though the handler already checked it, and
    /// the token gets a row in the orders table before the debit runs.
    pub async fn make_withdrawal(
        &self,
        user_id: i64,
        number: &str,
        sum: Decimal,
    ) -> Result<(), WithdrawalServiceError> {
        if !luhn::is_valid(number) {
            return Err(WithdrawalServiceError::BadOrderNumber);
        }
        if sum <= Decimal::ZERO {
            return Err(WithdrawalServiceError::BadSum);
        }

        match self.orders.get_or_create(user_id, number).await {
            Ok((_, created)) => {
                if created {
                    debug!("created order row for withdrawal token {}", number);
                }
            }
            // the user's own row already exists, nothing to create
            Err(OrderStoreError::AlreadyOwnedByUser) => {}
            // a number registered to someone else cannot label this debit
            Err(OrderStoreError::OwnedByOtherUser) => {
                warn!(
                    "user {} tried to withdraw against foreign order {}",
                    user_id, number
                );
                return Err(WithdrawalServiceError::BadOrderNumber);
            }
            Err(OrderStoreError::Database(err)) => {
                return Err(WithdrawalServiceError::Storage(err));
            }
        }

        match self
            .withdrawals
            .debit_with_balance_check(user_id, number, sum)
            .await
        {
            Ok(()) => {
                info!("user {} withdrew {} against order {}", user_id, sum, number);
                Ok(())
            }
            Err(WithdrawalStoreError::InsufficientBalance) => {
                Err(WithdrawalServiceError::NotEnoughBalance)
            }
            Err(WithdrawalStoreError::Database(err)) => {
                Err(WithdrawalServiceError::Storage(err))
            }
        }
    }

    /// The user's withdrawal history, most recent first.
    pub async fn list(&self, user_id: i64) -> Result<Vec<Withdrawal>, WithdrawalServiceError> {
        self.withdrawals
            .list_by_user(user_id)
            .await
            .map_err(WithdrawalServiceError::Storage)
    }
}
