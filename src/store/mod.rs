pub mod balance;
pub mod orders;
pub mod users;
pub mod withdrawals;

pub use balance::BalanceStore;
pub use orders::{OrderStore, OrderStoreError};
pub use users::{UserStore, UserStoreError};
pub use withdrawals::{WithdrawalStore, WithdrawalStoreError};

/// Postgres unique-constraint violation, the signal that a concurrent
/// transaction committed the same key first.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}
