//! # Restock Worker
//!
//! Background loop that executes due scheduled tasks and settles orders
//! interrupted mid-saga.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          RestockWorker                                  │
//! │                                                                         │
//! │   start ──► recover_incomplete_orders(stale_order_secs)                 │
//! │                                                                         │
//! │   every poll_interval_secs:                                             │
//! │     ┌─────────────────────────────────────────────────────────────┐     │
//! │     │ due(now, max_attempts, batch_size)                          │     │
//! │     │   ReturnRestock → ReturnService::complete                   │     │
//! │     │     ok    → mark_completed                                  │     │
//! │     │     error → mark_failed, retry after retry_delay_secs       │     │
//! │     └─────────────────────────────────────────────────────────────┘     │
//! │     recovery again every RECOVERY_EVERY ticks                           │
//! │                                                                         │
//! │   shutdown_rx ──► break                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tasks live in the database, so a restart simply picks up whatever is
//! due. Completing a return is a compare-and-set, so a task that runs twice
//! restores stock once.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use storefront_core::{ScheduledTask, TaskKind};
use storefront_db::Database;

use crate::checkout::CheckoutService;
use crate::config::StorefrontConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::postsale::{RestockPayload, ReturnService};

/// Recovery runs on start-up and then once per this many polls.
const RECOVERY_EVERY: u64 = 12;

/// Outcome of one polling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerPass {
    pub completed: usize,
    pub failed: usize,
}

pub struct RestockWorker {
    db: Database,
    config: Arc<StorefrontConfig>,
    returns: ReturnService,
    checkout: CheckoutService,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running worker.
#[derive(Clone)]
pub struct RestockWorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl RestockWorkerHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> ServiceResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| ServiceError::WorkerStopped)
    }
}

impl RestockWorker {
    pub fn new(
        db: Database,
        config: Arc<StorefrontConfig>,
        returns: ReturnService,
        checkout: CheckoutService,
    ) -> (Self, RestockWorkerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = RestockWorker {
            db,
            config,
            returns,
            checkout,
            shutdown_rx,
        };

        (worker, RestockWorkerHandle { shutdown_tx })
    }

    /// Runs the polling loop until shutdown. Spawn it as a background task.
    pub async fn run(mut self) {
        info!("Restock worker starting");

        self.recover().await;

        let poll_interval = Duration::from_secs(self.config.worker.poll_interval_secs);
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    ticks += 1;

                    match self.process_due(Utc::now()).await {
                        Ok(pass) if pass != WorkerPass::default() => {
                            info!(completed = pass.completed, failed = pass.failed, "Processed scheduled tasks");
                        }
                        Ok(_) => {}
                        Err(e) => error!(?e, "Failed to process scheduled tasks"),
                    }

                    if ticks % RECOVERY_EVERY == 0 {
                        self.recover().await;
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Restock worker shutting down");
                    break;
                }
            }
        }

        info!("Restock worker stopped");
    }

    async fn recover(&self) {
        let older_than = Duration::from_secs(self.config.worker.stale_order_secs);

        match self.checkout.recover_incomplete_orders(older_than).await {
            Ok(report) => {
                if !report.unresolved.is_empty() {
                    error!(orders = ?report.unresolved, "Interrupted orders could not be settled");
                }
                if !report.rolled_forward.is_empty() || !report.compensated.is_empty() {
                    info!(
                        rolled_forward = report.rolled_forward.len(),
                        compensated = report.compensated.len(),
                        "Recovered interrupted orders"
                    );
                }
            }
            Err(e) => error!(?e, "Order recovery failed"),
        }
    }

    /// Runs every task due at `now`, once.
    pub async fn process_due(&self, now: DateTime<Utc>) -> ServiceResult<WorkerPass> {
        let settings = &self.config.worker;
        let now_ms = now.timestamp_millis();
        let tasks = self
            .db
            .tasks()
            .due(now_ms, settings.max_attempts, settings.batch_size)
            .await?;

        if tasks.is_empty() {
            debug!("No scheduled tasks due");
            return Ok(WorkerPass::default());
        }

        let mut pass = WorkerPass::default();

        for task in tasks {
            match self.execute(&task).await {
                Ok(()) => {
                    self.db.tasks().mark_completed(&task.id).await?;
                    pass.completed += 1;
                }
                Err(e) => {
                    let retry_at_ms = now_ms + (settings.retry_delay_secs as i64) * 1000;
                    self.db.tasks().mark_failed(&task.id, &e.to_string(), retry_at_ms).await?;
                    pass.failed += 1;

                    if task.attempts + 1 >= settings.max_attempts {
                        error!(task_id = %task.id, kind = ?task.kind, error = %e, "Scheduled task exhausted its attempts");
                    } else {
                        warn!(task_id = %task.id, attempt = task.attempts + 1, error = %e, "Scheduled task failed, will retry");
                    }
                }
            }
        }

        Ok(pass)
    }

    async fn execute(&self, task: &ScheduledTask) -> ServiceResult<()> {
        match task.kind {
            TaskKind::ReturnRestock => {
                let payload: RestockPayload = serde_json::from_str(&task.payload)?;

                if self.returns.complete(payload.return_id).await?.is_none() {
                    // Already returned by an earlier run
                    debug!(return_id = payload.return_id, "Return not in approved state, nothing to restock");
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{Carts, GuestCartStore};
    use crate::notify::LogNotifier;
    use storefront_core::money::Money;
    use storefront_db::DbConfig;

    fn worker(db: &Database) -> (RestockWorker, RestockWorkerHandle) {
        let config = Arc::new(StorefrontConfig::default());
        let guest = Arc::new(GuestCartStore::new(std::env::temp_dir().join("unused-guest-cart.json")));
        let checkout = CheckoutService::new(
            db.clone(),
            Carts::new(db.clone(), guest),
            Arc::new(LogNotifier),
            Money::from_cents(0),
        );
        let returns = ReturnService::new(db.clone(), 30, Duration::from_secs(30));
        RestockWorker::new(db.clone(), config, returns, checkout)
    }

    #[tokio::test]
    async fn test_bad_payload_is_retried_later() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (worker, _handle) = worker(&db);
        let now = Utc::now();

        db.tasks()
            .enqueue(TaskKind::ReturnRestock, "not json".to_string(), now.timestamp_millis())
            .await
            .unwrap();

        let pass = worker.process_due(now).await.unwrap();
        assert_eq!(pass, WorkerPass { completed: 0, failed: 1 });

        // Pushed back by retry_delay_secs
        assert_eq!(worker.process_due(now).await.unwrap(), WorkerPass::default());
        assert_eq!(db.tasks().count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_return_completes_as_noop() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (worker, _handle) = worker(&db);
        let now = Utc::now();

        let payload = serde_json::to_string(&RestockPayload { return_id: 42 }).unwrap();
        db.tasks()
            .enqueue(TaskKind::ReturnRestock, payload, now.timestamp_millis() + 1000)
            .await
            .unwrap();

        // Not due yet
        assert_eq!(worker.process_due(now).await.unwrap(), WorkerPass::default());

        let later = now + chrono::Duration::seconds(2);
        assert_eq!(worker.process_due(later).await.unwrap().completed, 1);
        assert_eq!(db.tasks().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_handle_stops_worker() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (worker, handle) = worker(&db);

        let join = tokio::spawn(worker.run());
        handle.shutdown().await.unwrap();
        join.await.unwrap();
    }
}
