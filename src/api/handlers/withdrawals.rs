use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::middleware::AuthUser;
use crate::models::WithdrawalResponse;
use crate::services::withdrawals::WithdrawalServiceError;
use crate::AppState;

use super::{error_response, ErrorResponse};

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub order: String,
    pub sum: Decimal,
}

/// Debit points against an order number
/// POST /api/user/balance/withdraw
pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<WithdrawRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    match state
        .withdrawal_service
        .make_withdrawal(auth_user.id, &req.order, req.sum)
        .await
    {
        Ok(()) => Ok(StatusCode::OK),
        Err(WithdrawalServiceError::BadOrderNumber) => Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "BAD_ORDER_NUMBER",
            "order number failed the checksum",
        )),
        Err(WithdrawalServiceError::BadSum) => Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "BAD_SUM",
            "withdrawal sum must be positive",
        )),
        Err(WithdrawalServiceError::NotEnoughBalance) => Err(error_response(
            StatusCode::PAYMENT_REQUIRED,
            "NOT_ENOUGH_BALANCE",
            "not enough balance",
        )),
        Err(err) => {
            tracing::error!(
                "withdrawal failed for user {} order {}: {}",
                auth_user.id,
                req.order,
                err
            );
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "internal server error",
            ))
        }
    }
}

/// List the user's withdrawals, most recent first
/// GET /api/user/withdrawals
pub async fn list_withdrawals(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let withdrawals = state
        .withdrawal_service
        .list(auth_user.id)
        .await
        .map_err(|err| {
            tracing::error!(
                "failed to list withdrawals for user {}: {}",
                auth_user.id,
                err
            );
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "internal server error",
            )
        })?;

    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<WithdrawalResponse> = withdrawals.into_iter().map(Into::into).collect();
    Ok(Json(body).into_response())
}
