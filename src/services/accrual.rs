//! Typed client for the external accrual system.
//!
//! `GET {base}/api/orders/{number}` answered by status code:
//! 200 carries the evaluation JSON, 204 means the order is unknown,
//! 429 carries a Retry-After backoff, 500 is a transient fault.

use std::time::Duration;

use reqwest::{header, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Backoff applied when a 429 arrives without a usable Retry-After.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccrualStatus {
    Registered,
    Invalid,
    Processing,
    Processed,
}

impl AccrualStatus {
    /// Whether the accrual system is done with the order.
    pub fn is_final(self) -> bool {
        matches!(self, AccrualStatus::Invalid | AccrualStatus::Processed)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccrualOrderInfo {
    pub order: String,
    pub status: AccrualStatus,
    accrual: Option<Decimal>,
}

impl AccrualOrderInfo {
    /// The awarded points, zero when the field is absent.
    pub fn accrual(&self) -> Decimal {
        self.accrual.unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccrualError {
    #[error("accrual system rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("accrual system internal error")]
    ServerError,

    #[error("unexpected status {0} from accrual system")]
    UnexpectedStatus(u16),

    #[error("accrual request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Stateless HTTP client; the configured timeout is the per-call
/// deadline for every lookup.
#[derive(Clone)]
pub struct AccrualClient {
    base_url: String,
    http: reqwest::Client,
}

impl AccrualClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Fetches the evaluation of one order. `Ok(None)` means the accrual
    /// system does not know the number (yet).
    pub async fn get_order_info(
        &self,
        number: &str,
    ) -> Result<Option<AccrualOrderInfo>, AccrualError> {
        let url = format!("{}/api/orders/{}", self.base_url, number);
        let response = self.http.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = parse_retry_after(
                    response
                        .headers()
                        .get(header::RETRY_AFTER)
                        .and_then(|value| value.to_str().ok()),
                );
                Err(AccrualError::RateLimited { retry_after })
            }
            StatusCode::INTERNAL_SERVER_ERROR => Err(AccrualError::ServerError),
            other => Err(AccrualError::UnexpectedStatus(other.as_u16())),
        }
    }
}

fn parse_retry_after(value: Option<&str>) -> Duration {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn retry_after_parses_integer_seconds() {
        assert_eq!(parse_retry_after(Some("2")), Duration::from_secs(2));
        assert_eq!(parse_retry_after(Some(" 30 ")), Duration::from_secs(30));
    }

    #[test]
    fn retry_after_falls_back_to_default() {
        assert_eq!(parse_retry_after(None), DEFAULT_RETRY_AFTER);
        assert_eq!(parse_retry_after(Some("soon")), DEFAULT_RETRY_AFTER);
        assert_eq!(parse_retry_after(Some("")), DEFAULT_RETRY_AFTER);
    }

    #[test]
    fn decodes_processed_order() {
        let info: AccrualOrderInfo = serde_json::from_str(
            r#"{"order":"79927398713","status":"PROCESSED","accrual":42.5}"#,
        )
        .unwrap();
        assert_eq!(info.status, AccrualStatus::Processed);
        assert_eq!(info.accrual(), dec!(42.5));
    }

    #[test]
    fn missing_accrual_reads_as_zero() {
        let info: AccrualOrderInfo =
            serde_json::from_str(r#"{"order":"79927398713","status":"REGISTERED"}"#).unwrap();
        assert_eq!(info.status, AccrualStatus::Registered);
        assert_eq!(info.accrual(), Decimal::ZERO);
    }

    #[test]
    fn final_statuses() {
        assert!(AccrualStatus::Invalid.is_final());
        assert!(AccrualStatus::Processed.is_final());
        assert!(!AccrualStatus::Registered.is_final());
        assert!(!AccrualStatus::Processing.is_final());
    }
}
