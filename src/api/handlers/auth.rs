//! Registration and login.
//!
//! Both issue the same JWT, returned in the response body, the
//! `Authorization` header and the auth cookie.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::AppendHeaders,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::auth::{jwt::JwtManager, middleware::AUTH_COOKIE, password};
use crate::store::UserStoreError;
use crate::AppState;

use super::{error_response, ErrorResponse};

#[derive(Debug, Deserialize, Validate)]
pub struct CredentialsRequest {
    #[validate(length(min = 3, max = 50))]
    pub login: String,
    #[validate(length(min = 6, max = 100))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
}

type AuthResult = Result<
    (
        CookieJar,
        AppendHeaders<[(header::HeaderName, String); 1]>,
        Json<AuthResponse>,
    ),
    (StatusCode, Json<ErrorResponse>),
>;

/// Register a new user
/// POST /api/user/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<CredentialsRequest>,
) -> AuthResult {
    if req.validate().is_err() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_CREDENTIALS",
            "login must be 3-50 characters, password 6-100",
        ));
    }

    let password_hash = password::hash(&req.password).map_err(|e| {
        tracing::error!("password hashing failed: {}", e);
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "HASHING_FAILED",
            "internal server error",
        )
    })?;

    let user_id = match state.users.create(&req.login, &password_hash).await {
        Ok(id) => id,
        Err(UserStoreError::LoginTaken) => {
            return Err(error_response(
                StatusCode::CONFLICT,
                "LOGIN_TAKEN",
                "login already taken",
            ));
        }
        Err(err) => {
            tracing::error!("failed to register user: {}", err);
            return Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "internal server error",
            ));
        }
    };

    tracing::info!("user {} registered with id {}", req.login, user_id);
    issue_token(&state, user_id, &req.login, jar)
}

/// Authenticate an existing user
/// POST /api/user/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<CredentialsRequest>,
) -> AuthResult {
    if req.validate().is_err() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_CREDENTIALS",
            "login must be 3-50 characters, password 6-100",
        ));
    }

    let user = match state.users.find_by_login(&req.login).await {
        Ok(user) => user,
        Err(UserStoreError::NotFound) => {
            return Err(bad_credentials());
        }
        Err(err) => {
            tracing::error!("login lookup failed: {}", err);
            return Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "internal server error",
            ));
        }
    };

    if !password::verify(&req.password, &user.password_hash) {
        tracing::warn!("failed login attempt for {}", req.login);
        return Err(bad_credentials());
    }

    tracing::info!("user {} logged in", user.login);
    issue_token(&state, user.id, &user.login, jar)
}

fn bad_credentials() -> (StatusCode, Json<ErrorResponse>) {
    error_response(
        StatusCode::UNAUTHORIZED,
        "BAD_CREDENTIALS",
        "unknown login or wrong password",
    )
}

fn issue_token(state: &AppState, user_id: i64, login: &str, jar: CookieJar) -> AuthResult {
    let jwt_manager = JwtManager::new(&state.config.jwt_secret, state.config.jwt_expiry_seconds);
    let token = jwt_manager.generate_token(user_id, login).map_err(|e| {
        tracing::error!("failed to generate JWT: {}", e);
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "JWT_GENERATION_FAILED",
            "internal server error",
        )
    })?;

    let cookie = Cookie::build((AUTH_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .build();

    Ok((
        jar.add(cookie),
        AppendHeaders([(header::AUTHORIZATION, format!("Bearer {token}"))]),
        Json(AuthResponse { token }),
    ))
}
