pub mod accrual;
pub mod orders;
pub mod reconciliation;
pub mod withdrawals;
