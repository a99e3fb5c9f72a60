use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, histogram};
use sqlx::Error as SqlxError;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use joblane_storage::Database;

const RETENTION_DAYS: i64 = 30;
const BATCH_LIMIT: i64 = 1000;
const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Background worker that prunes old read notifications and keeps the WAL
/// in shape. Unread notifications are never touched, whatever their age.
#[derive(Clone)]
pub struct MaintenanceWorker {
    database: Database,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    interval: Duration,
}

impl MaintenanceWorker {
    /// Creates a worker with default clock and cadence.
    pub fn new(database: Database) -> Self {
        Self {
            database,
            clock: Arc::new(Utc::now),
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Overrides the clock used for determining retention thresholds.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs the worker loop in the background.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop().await;
        })
    }

    async fn run_loop(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.run_once().await {
                error!(stage = "storage", error = %err, "maintenance run failed");
            }
        }
    }

    /// Executes one maintenance cycle (retention sweep + checkpoint).
    pub async fn run_once(&self) -> Result<(), MaintenanceError> {
        let now = (self.clock)();
        let threshold = now - ChronoDuration::days(RETENTION_DAYS);

        let (deleted, busy) = self.prune_read_notifications(threshold).await?;
        info!(
            stage = "storage",
            deleted,
            busy,
            threshold = %threshold.to_rfc3339(),
            "notification retention sweep completed"
        );

        self.run_checkpoint().await?;
        Ok(())
    }

    async fn prune_read_notifications(
        &self,
        threshold: DateTime<Utc>,
    ) -> Result<(u64, bool), MaintenanceError> {
        let repo = self.database.notifications();
        let mut total_deleted = 0u64;
        let mut busy = false;

        loop {
            match repo
                .delete_read_older_than_batch(threshold, BATCH_LIMIT)
                .await
            {
                Ok(0) => break,
                Ok(batch_deleted) => {
                    total_deleted += batch_deleted;
                    counter!("notifications_pruned_total").increment(batch_deleted);
                }
                Err(err) => {
                    if is_sqlite_busy(&err) {
                        busy = true;
                        counter!("db_busy_total", "op" => "retention").increment(1);
                        warn!(stage = "storage", error = %err, "retention delete hit busy timeout");
                        break;
                    }

                    return Err(MaintenanceError::Retention { source: err });
                }
            }
        }

        Ok((total_deleted, busy))
    }

    async fn run_checkpoint(&self) -> Result<(), MaintenanceError> {
        let start = std::time::Instant::now();
        match self.database.wal_checkpoint_truncate().await {
            Ok(stats) => {
                let duration = start.elapsed().as_secs_f64();
                histogram!("db_checkpoint_seconds").record(duration);
                if stats.busy_frames > 0 {
                    counter!("db_busy_total", "op" => "checkpoint").increment(1);
                    warn!(
                        stage = "storage",
                        busy_frames = stats.busy_frames,
                        log_frames = stats.log_frames,
                        checkpointed_frames = stats.checkpointed_frames,
                        duration_secs = duration,
                        "WAL checkpoint completed with busy frames"
                    );
                } else {
                    info!(
                        stage = "storage",
                        log_frames = stats.log_frames,
                        checkpointed_frames = stats.checkpointed_frames,
                        duration_secs = duration,
                        "WAL checkpoint completed"
                    );
                }
                Ok(())
            }
            Err(err) => {
                if is_sqlite_busy(&err) {
                    counter!("db_busy_total", "op" => "checkpoint").increment(1);
                    warn!(stage = "storage", error = %err, "WAL checkpoint hit busy timeout");
                    return Ok(());
                }
                Err(MaintenanceError::Checkpoint { source: err })
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("failed to prune read notifications")]
    Retention {
        #[source]
        source: SqlxError,
    },
    #[error("failed to run WAL checkpoint")]
    Checkpoint {
        #[source]
        source: SqlxError,
    },
}

fn is_sqlite_busy(err: &SqlxError) -> bool {
    match err {
        SqlxError::Database(db_err) => matches!(db_err.code().as_deref(), Some("5") | Some("6")),
        _ => false,
    }
}
