use sqlx::PgPool;

use super::is_unique_violation;
use crate::models::User;

#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    #[error("login already taken")]
    LoginTaken,

    #[error("user not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct UserStore {
    pool: PgPool,
}

impl UserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, login: &str, password_hash: &str) -> Result<i64, UserStoreError> {
        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (login, password_hash) VALUES ($1, $2) RETURNING id",
        )
        .bind(login)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(user_id) => Ok(user_id),
            Err(err) if is_unique_violation(&err) => Err(UserStoreError::LoginTaken),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn find_by_login(&self, login: &str) -> Result<User, UserStoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, login, password_hash, created_at FROM users WHERE login = $1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        user.ok_or(UserStoreError::NotFound)
    }
}
