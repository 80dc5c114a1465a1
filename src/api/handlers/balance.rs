use axum::{extract::State, http::StatusCode, Extension, Json};
use std::sync::Arc;

use crate::auth::middleware::AuthUser;
use crate::models::BalanceResponse;
use crate::AppState;

use super::{error_response, ErrorResponse};

/// Current and withdrawn points for the authenticated user
/// GET /api/user/balance
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<BalanceResponse>, (StatusCode, Json<ErrorResponse>)> {
    let balance = state.balance.get(auth_user.id).await.map_err(|e| {
        tracing::error!("failed to fetch balance for user {}: {}", auth_user.id, e);
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "internal server error",
        )
    })?;

    Ok(Json(balance.into()))
}
