//! Reconciliation engine: drives NEW orders to a terminal status.
//!
//! A fixed pool of workers polls the order store, leases each pending
//! order, asks the accrual system for its evaluation and writes the
//! result back. A 429 from the accrual system is broadcast to the whole
//! pool through a single-slot channel so every worker backs off; one
//! retained signal is enough, later duplicates overwrite it harmlessly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::models::OrderStatus;
use crate::services::accrual::{AccrualClient, AccrualError, AccrualOrderInfo, AccrualStatus};
use crate::store::{OrderStore, OrderStoreError};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub workers: usize,
    pub poll_interval: Duration,
    pub batch_size: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
        }
    }
}

/// What a worker does with one leased order after the accrual lookup.
#[derive(Debug, PartialEq)]
enum OrderAction {
    /// Write the terminal status and accrual.
    Finalize {
        status: OrderStatus,
        accrual: Decimal,
    },
    /// Return the order to NEW; the next poll retries it.
    Retry,
    /// Return the order to NEW, signal the pool and abandon the batch.
    Backoff(Duration),
}

fn classify(result: Result<Option<AccrualOrderInfo>, AccrualError>) -> OrderAction {
    match result {
        Ok(Some(info)) => match info.status {
            AccrualStatus::Processed => OrderAction::Finalize {
                status: OrderStatus::Processed,
                accrual: info.accrual(),
            },
            AccrualStatus::Invalid => OrderAction::Finalize {
                status: OrderStatus::Invalid,
                accrual: Decimal::ZERO,
            },
            AccrualStatus::Registered | AccrualStatus::Processing => OrderAction::Retry,
        },
        Ok(None) => OrderAction::Retry,
        Err(AccrualError::RateLimited { retry_after }) => OrderAction::Backoff(retry_after),
        Err(_) => OrderAction::Retry,
    }
}

pub struct ReconciliationEngine {
    store: OrderStore,
    accrual: AccrualClient,
    config: EngineConfig,
    rate_limit_tx: broadcast::Sender<Duration>,
    shutdown_tx: broadcast::Sender<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ReconciliationEngine {
    pub fn new(store: OrderStore, accrual: AccrualClient, config: EngineConfig) -> Self {
        let (rate_limit_tx, _) = broadcast::channel(1);
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            store,
            accrual,
            config,
            rate_limit_tx,
            shutdown_tx,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the worker pool. Call once at startup.
    pub fn start(self: Arc<Self>) {
        let mut workers = self.workers.lock().unwrap();
        for worker_id in 0..self.config.workers {
            let engine = Arc::clone(&self);
            // subscribe before spawning so a signal sent right after
            // start() cannot be missed
            let rate_limit_rx = self.rate_limit_tx.subscribe();
            let shutdown_rx = self.shutdown_tx.subscribe();
            workers.push(tokio::spawn(async move {
                engine.worker_loop(worker_id, rate_limit_rx, shutdown_rx).await;
            }));
        }
        info!("reconciliation engine started with {} workers", workers.len());
    }

    /// Signals every worker to exit and waits for all of them. In-flight
    /// accrual lookups and finalizes run to completion under their own
    /// deadlines; a worker sleeping on a rate limit wakes immediately.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(());
        let handles: Vec<_> = self.workers.lock().unwrap().drain(..).collect();
        for result in futures::future::join_all(handles).await {
            if let Err(err) = result {
                error!("reconciliation worker terminated abnormally: {}", err);
            }
        }
        info!("reconciliation engine stopped");
    }

    async fn worker_loop(
        &self,
        worker_id: usize,
        mut rate_limit_rx: broadcast::Receiver<Duration>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!("reconciliation worker {} started", worker_id);
        loop {
            // shutdown wins over a pending rate-limit signal, which in
            // turn wins over the poll tick
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => break,
                received = rate_limit_rx.recv() => match received {
                    Ok(delay) => {
                        info!("worker {}: backing off {:?} after accrual rate limit", worker_id, delay);
                        tokio::select! {
                            _ = shutdown_rx.recv() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                        ticker.reset();
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = ticker.tick() => {
                    if let Err(err) = self.process_batch(worker_id).await {
                        error!("worker {}: batch processing failed: {}", worker_id, err);
                    }
                }
            }
        }
        debug!("reconciliation worker {} exiting", worker_id);
    }

    async fn process_batch(&self, worker_id: usize) -> Result<(), OrderStoreError> {
        let pending = self.store.claim_pending(self.config.batch_size).await?;
        if pending.is_empty() {
            return Ok(());
        }
        debug!("worker {}: picked up {} pending orders", worker_id, pending.len());

        for order in pending {
            if !self
                .store
                .update_status(order.id, OrderStatus::Processing)
                .await?
            {
                // another worker holds the lease
                continue;
            }

            let result = self.accrual.get_order_info(&order.order_number).await;
            if let Err(err) = &result {
                if !matches!(err, AccrualError::RateLimited { .. }) {
                    warn!(
                        "worker {}: accrual lookup failed for order {}: {}",
                        worker_id, order.order_number, err
                    );
                }
            }

            match classify(result) {
                OrderAction::Finalize { status, accrual } => {
                    match self
                        .store
                        .finalize(order.user_id, &order.order_number, status, accrual)
                        .await
                    {
                        Ok(()) => {
                            info!(
                                "worker {}: order {} finalized as {} (accrual: {})",
                                worker_id, order.order_number, status, accrual
                            );
                        }
                        Err(err) => {
                            error!(
                                "worker {}: finalize failed for order {}: {}",
                                worker_id, order.order_number, err
                            );
                            self.release(order.id).await;
                        }
                    }
                }
                OrderAction::Retry => self.release(order.id).await,
                OrderAction::Backoff(delay) => {
                    let _ = self.rate_limit_tx.send(delay);
                    self.release(order.id).await;
                    break;
                }
            }
        }

        Ok(())
    }

    async fn release(&self, order_id: i64) {
        if let Err(err) = self.store.update_status(order_id, OrderStatus::New).await {
            error!("failed to return order {} to the queue: {}", order_id, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn info(status: &str, accrual: Option<&str>) -> AccrualOrderInfo {
        let body = match accrual {
            Some(value) => format!(
                r#"{{"order":"79927398713","status":"{status}","accrual":{value}}}"#
            ),
            None => format!(r#"{{"order":"79927398713","status":"{status}"}}"#),
        };
        serde_json::from_str(&body).unwrap()
    }

    #[test]
    fn processed_order_is_finalized_with_accrual() {
        let action = classify(Ok(Some(info("PROCESSED", Some("42.5")))));
        assert_eq!(
            action,
            OrderAction::Finalize {
                status: OrderStatus::Processed,
                accrual: dec!(42.5),
            }
        );
    }

    #[test]
    fn invalid_order_is_finalized_without_accrual() {
        let action = classify(Ok(Some(info("INVALID", None))));
        assert_eq!(
            action,
            OrderAction::Finalize {
                status: OrderStatus::Invalid,
                accrual: Decimal::ZERO,
            }
        );
    }

    #[test]
    fn pending_statuses_retry() {
        assert_eq!(
            classify(Ok(Some(info("REGISTERED", None)))),
            OrderAction::Retry
        );
        assert_eq!(
            classify(Ok(Some(info("PROCESSING", None)))),
            OrderAction::Retry
        );
    }

    #[test]
    fn unknown_order_retries() {
        assert_eq!(classify(Ok(None)), OrderAction::Retry);
    }

    #[test]
    fn rate_limit_backs_off_with_the_advertised_delay() {
        let action = classify(Err(AccrualError::RateLimited {
            retry_after: Duration::from_secs(2),
        }));
        assert_eq!(action, OrderAction::Backoff(Duration::from_secs(2)));
    }

    #[test]
    fn default_tuning() {
        let config = EngineConfig::default();
        assert_eq!(config.workers, 3);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn transient_errors_retry() {
        assert_eq!(classify(Err(AccrualError::ServerError)), OrderAction::Retry);
        assert_eq!(
            classify(Err(AccrualError::UnexpectedStatus(502))),
            OrderAction::Retry
        );
    }
}
