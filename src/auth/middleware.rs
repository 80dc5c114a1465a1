use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

use crate::auth::jwt::JwtManager;
use crate::AppState;

/// Cookie carrying the auth token; checked before the bearer header.
pub const AUTH_COOKIE: &str = "auth_token";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub login: String,
}

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = jar
        .get(AUTH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .or_else(|| bearer_token(&request));

    let Some(token) = token else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    let jwt_manager = JwtManager::new(&state.config.jwt_secret, state.config.jwt_expiry_seconds);
    let claims = jwt_manager
        .verify_token(&token)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    request.extensions_mut().insert(AuthUser {
        id: claims.user_id,
        login: claims.sub,
    });

    Ok(next.run(request).await)
}

fn bearer_token(request: &Request<Body>) -> Option<String> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;

    auth_header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
}
