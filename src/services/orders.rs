//! Admission and listing of uploaded orders.
//!
//! Submission validates the number, stores the order durably and
//! returns; the reconciliation engine picks the row up on its next poll.

use tracing::{info, warn};

use crate::luhn;
use crate::models::Order;
use crate::store::{OrderStore, OrderStoreError};

pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum OrderServiceError {
    #[error("order number failed the checksum")]
    BadOrderNumber,

    #[error("order already uploaded by this user")]
    AlreadyUploaded,

    #[error("order already uploaded by another user")]
    UploadedByAnotherUser,

    #[error("no orders uploaded")]
    NoOrders,

    #[error("pagination out of range")]
    BadPagination,

    #[error("storage failure: {0}")]
    Storage(#[source] OrderStoreError),
}

#[derive(Clone)]
pub struct OrderService {
    store: OrderStore,
}

impl OrderService {
    pub fn new(store: OrderStore) -> Self {
        Self { store }
    }

    /// Accepts a new order number for the user. Success means the order
    /// is durably stored in status NEW.
    pub async fn submit(&self, user_id: i64, number: &str) -> Result<i64, OrderServiceError> {
        if !luhn::is_valid(number) {
            warn!("rejected order number for user {}: checksum failed", user_id);
            return Err(OrderServiceError::BadOrderNumber);
        }

        match self.store.insert_order(user_id, number).await {
            Ok(order_id) => {
                info!("user {} uploaded order {}", user_id, number);
                Ok(order_id)
            }
            Err(OrderStoreError::AlreadyOwnedByUser) => Err(OrderServiceError::AlreadyUploaded),
            Err(OrderStoreError::OwnedByOtherUser) => {
                Err(OrderServiceError::UploadedByAnotherUser)
            }
            Err(err) => Err(OrderServiceError::Storage(err)),
        }
    }

    /// The user's orders, newest first. An empty result is reported as
    /// [`OrderServiceError::NoOrders`] so the handler can answer 204.
    pub async fn list(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, OrderServiceError> {
        if !(1..=MAX_PAGE_SIZE).contains(&limit) || offset < 0 {
            return Err(OrderServiceError::BadPagination);
        }

        let orders = self
            .store
            .list_by_user(user_id, limit, offset)
            .await
            .map_err(OrderServiceError::Storage)?;

        if orders.is_empty() {
            return Err(OrderServiceError::NoOrders);
        }
        Ok(orders)
    }
}
