use std::sync::Arc;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::MakeRequestUuid;
use tower_http::trace::TraceLayer;
use tower_http::ServiceBuilderExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod auth;
mod config;
mod db;
mod luhn;
mod models;
mod services;
mod store;

use crate::config::AppConfig;
use crate::db::Database;
use crate::services::accrual::AccrualClient;
use crate::services::orders::OrderService;
use crate::services::reconciliation::{EngineConfig, ReconciliationEngine};
use crate::services::withdrawals::WithdrawalService;
use crate::store::{BalanceStore, OrderStore, UserStore, WithdrawalStore};

pub struct AppState {
    pub config: AppConfig,
    pub users: UserStore,
    pub balance: BalanceStore,
    pub order_service: OrderService,
    pub withdrawal_service: WithdrawalService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loyalty_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("Starting loyalty backend v{}", env!("CARGO_PKG_VERSION"));

    // Initialize database (runs pending migrations)
    let db = Database::connect(&config.database_uri).await?;
    tracing::info!("Database connected");

    let order_store = OrderStore::new(db.pool.clone());
    let withdrawal_store = WithdrawalStore::new(db.pool.clone());
    let balance_store = BalanceStore::new(db.pool.clone());
    let user_store = UserStore::new(db.pool.clone());

    // Accrual client shared by the reconciliation workers
    let accrual_client =
        AccrualClient::new(&config.accrual_system_address, config.accrual_timeout())?;
    tracing::info!(
        "Accrual client targeting {} (timeout: {}s)",
        config.accrual_system_address,
        config.accrual_system_timeout
    );

    // Start the reconciliation engine
    let engine = Arc::new(ReconciliationEngine::new(
        order_store.clone(),
        accrual_client,
        EngineConfig {
            workers: config.reconcile_workers,
            poll_interval: config.reconcile_poll_interval(),
            batch_size: config.reconcile_batch_size,
        },
    ));
    engine.clone().start();

    // Build application state
    let state = Arc::new(AppState {
        order_service: OrderService::new(order_store.clone()),
        withdrawal_service: WithdrawalService::new(order_store, withdrawal_store),
        balance: balance_store,
        users: user_store,
        config: config.clone(),
    });

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/api/user", api::routes::create_router(state.clone()))
        .layer(
            ServiceBuilder::new()
                .set_x_request_id(MakeRequestUuid)
                .layer(TraceLayer::new_for_http())
                .propagate_x_request_id()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.run_address).await?;
    tracing::info!("Server listening on {}", config.run_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The server has drained; let the workers finish their batches
    engine.stop().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
