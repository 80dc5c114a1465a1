use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connection pool shared by request handlers and the reconciliation
/// workers. Pending migrations are applied on connect.
#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn connect(database_uri: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(30)
            .min_connections(5)
            .connect(database_uri)
            .await?;

        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }
}
