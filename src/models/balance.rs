#![allow(dead_code)]
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row of the `user_balance` view. Every registered user has one.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserBalance {
    pub user_id: i64,
    pub total_accrued: Decimal,
    pub total_withdrawn: Decimal,
    pub current_balance: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub current: Decimal,
    pub withdrawn: Decimal,
}

impl From<UserBalance> for BalanceResponse {
    fn from(balance: UserBalance) -> Self {
        Self {
            current: balance.current_balance,
            withdrawn: balance.total_withdrawn,
        }
    }
}
