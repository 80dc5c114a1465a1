use serde::Deserialize;
use std::time::Duration;

/// Process configuration, read from the environment (a `.env` file is
/// honored in development).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_run_address")]
    pub run_address: String,

    pub database_uri: String,

    /// Base URL of the external accrual system.
    pub accrual_system_address: String,

    /// Per-call deadline for accrual lookups, in seconds.
    #[serde(default = "default_accrual_timeout")]
    pub accrual_system_timeout: u64,

    pub jwt_secret: String,

    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_seconds: u64,

    #[serde(default = "default_reconcile_workers")]
    pub reconcile_workers: usize,

    #[serde(default = "default_reconcile_poll_secs")]
    pub reconcile_poll_secs: u64,

    #[serde(default = "default_reconcile_batch_size")]
    pub reconcile_batch_size: i64,
}

fn default_run_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_accrual_timeout() -> u64 {
    5
}

fn default_jwt_expiry() -> u64 {
    86400
}

fn default_reconcile_workers() -> usize {
    3
}

fn default_reconcile_poll_secs() -> u64 {
    5
}

fn default_reconcile_batch_size() -> i64 {
    10
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()
    }

    pub fn accrual_timeout(&self) -> Duration {
        Duration::from_secs(self.accrual_system_timeout)
    }

    pub fn reconcile_poll_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_poll_secs)
    }
}
