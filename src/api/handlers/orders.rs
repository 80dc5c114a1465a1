use axum::{
    body::to_bytes,
    extract::{Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::middleware::AuthUser;
use crate::models::OrderResponse;
use crate::services::orders::{OrderServiceError, MAX_PAGE_SIZE};
use crate::AppState;

use super::{error_response, ErrorResponse};

/// Order submissions larger than this are rejected outright.
const MAX_ORDER_BODY_BYTES: usize = 1024 * 1024; // 1 MiB

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Upload a new order number
/// POST /api/user/orders (text/plain body)
pub async fn submit_order(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    request: Request,
) -> Result<(StatusCode, &'static str), (StatusCode, Json<ErrorResponse>)> {
    let bytes = to_bytes(request.into_body(), MAX_ORDER_BODY_BYTES)
        .await
        .map_err(|_| {
            error_response(
                StatusCode::BAD_REQUEST,
                "BAD_BODY",
                "failed to read order number",
            )
        })?;

    let number = match std::str::from_utf8(&bytes) {
        Ok(text) => text.trim().to_string(),
        Err(_) => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "BAD_BODY",
                "order number must be plain text",
            ));
        }
    };

    if number.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "EMPTY_ORDER_NUMBER",
            "empty order number",
        ));
    }

    match state.order_service.submit(auth_user.id, &number).await {
        Ok(_) => Ok((StatusCode::ACCEPTED, "order accepted for processing")),
        Err(OrderServiceError::AlreadyUploaded) => Ok((StatusCode::OK, "order already uploaded")),
        Err(OrderServiceError::BadOrderNumber) => Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "BAD_ORDER_NUMBER",
            "order number failed the checksum",
        )),
        Err(OrderServiceError::UploadedByAnotherUser) => Err(error_response(
            StatusCode::CONFLICT,
            "ORDER_CONFLICT",
            "order already uploaded by another user",
        )),
        Err(err) => {
            tracing::error!("failed to store order {}: {}", number, err);
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "internal server error",
            ))
        }
    }
}

/// List the user's orders, newest first
/// GET /api/user/orders?limit={1..100}&offset={>=0}
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<OrdersQuery>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let limit = query.limit.unwrap_or(MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);

    match state.order_service.list(auth_user.id, limit, offset).await {
        Ok(orders) => {
            let body: Vec<OrderResponse> = orders.into_iter().map(Into::into).collect();
            Ok(Json(body).into_response())
        }
        Err(OrderServiceError::NoOrders) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(OrderServiceError::BadPagination) => Err(error_response(
            StatusCode::BAD_REQUEST,
            "BAD_PAGINATION",
            "limit must be in 1..=100 and offset non-negative",
        )),
        Err(err) => {
            tracing::error!("failed to list orders for user {}: {}", auth_user.id, err);
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "internal server error",
            ))
        }
    }
}
