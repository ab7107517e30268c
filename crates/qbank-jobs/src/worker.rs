//! Worker pool driving the task pipeline against the queue.
//!
//! Runs N normal pollers and M retry pollers plus a stuck-task reclaimer.
//! Each poller attempts exactly one claim-and-process cycle per tick,
//! gated by a shared counting semaphore; when the semaphore is saturated
//! the tick is skipped silently, so throughput degrades by widening
//! effective poll latency instead of growing memory.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use qbank_core::{defaults, QueueRepository};

use crate::pipeline::TaskPipeline;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of pollers claiming from the ready lane.
    pub normal_pollers: usize,
    /// Number of pollers claiming from the failed/retry lane.
    pub retry_pollers: usize,
    /// Process-wide ceiling on concurrently executing pipelines.
    pub max_concurrent: usize,
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum retry attempts before an entry stays failed.
    pub max_retries: i32,
    /// Age after which a processing entry is considered stuck.
    pub stuck_timeout_secs: u64,
    /// Interval between stuck-task reclaim passes.
    pub reclaim_interval_secs: u64,
    /// Whether to start any pollers at all.
    pub enabled: bool,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            normal_pollers: defaults::WORKER_NORMAL_POLLERS,
            retry_pollers: defaults::WORKER_RETRY_POLLERS,
            max_concurrent: defaults::WORKER_MAX_CONCURRENT,
            poll_interval_ms: defaults::WORKER_POLL_INTERVAL_MS,
            max_retries: defaults::MAX_RETRIES,
            stuck_timeout_secs: defaults::STUCK_TIMEOUT_SECS,
            reclaim_interval_secs: defaults::RECLAIM_INTERVAL_SECS,
            enabled: true,
        }
    }
}

impl WorkerPoolConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WORKER_ENABLED` | `true` | Enable/disable task processing |
    /// | `WORKER_NORMAL_POLLERS` | `2` | Ready-lane pollers |
    /// | `WORKER_RETRY_POLLERS` | `1` | Retry-lane pollers |
    /// | `WORKER_MAX_CONCURRENT` | `3` | Concurrency ceiling |
    /// | `WORKER_POLL_INTERVAL_MS` | `1000` | Poll interval |
    /// | `WORKER_MAX_RETRIES` | `3` | Retry budget per entry |
    /// | `WORKER_STUCK_TIMEOUT_SECS` | `300` | Stuck-entry age threshold |
    /// | `WORKER_RECLAIM_INTERVAL_SECS` | `60` | Reclaim pass interval |
    pub fn from_env() -> Self {
        fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<T>().ok())
                .unwrap_or(default)
        }

        let enabled = std::env::var("WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Self {
            normal_pollers: parse_var("WORKER_NORMAL_POLLERS", defaults::WORKER_NORMAL_POLLERS)
                .max(1),
            retry_pollers: parse_var("WORKER_RETRY_POLLERS", defaults::WORKER_RETRY_POLLERS),
            max_concurrent: parse_var("WORKER_MAX_CONCURRENT", defaults::WORKER_MAX_CONCURRENT)
                .max(1),
            poll_interval_ms: parse_var(
                "WORKER_POLL_INTERVAL_MS",
                defaults::WORKER_POLL_INTERVAL_MS,
            ),
            max_retries: parse_var("WORKER_MAX_RETRIES", defaults::MAX_RETRIES),
            stuck_timeout_secs: parse_var("WORKER_STUCK_TIMEOUT_SECS", defaults::STUCK_TIMEOUT_SECS),
            reclaim_interval_secs: parse_var(
                "WORKER_RECLAIM_INTERVAL_SECS",
                defaults::RECLAIM_INTERVAL_SECS,
            ),
            enabled,
        }
    }

    /// Set the number of normal-lane pollers.
    pub fn with_normal_pollers(mut self, n: usize) -> Self {
        self.normal_pollers = n;
        self
    }

    /// Set the number of retry-lane pollers.
    pub fn with_retry_pollers(mut self, n: usize) -> Self {
        self.retry_pollers = n;
        self
    }

    /// Set the concurrency ceiling.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set the poll interval in milliseconds.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the retry budget per entry.
    pub fn with_max_retries(mut self, max: i32) -> Self {
        self.max_retries = max;
        self
    }

    /// Set the stuck-entry age threshold in seconds.
    pub fn with_stuck_timeout(mut self, secs: u64) -> Self {
        self.stuck_timeout_secs = secs;
        self
    }

    /// Set the reclaim pass interval in seconds.
    pub fn with_reclaim_interval(mut self, secs: u64) -> Self {
        self.reclaim_interval_secs = secs;
        self
    }

    /// Enable or disable task processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Which queue lane a poller claims from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Normal,
    Retry,
}

impl Lane {
    fn as_str(self) -> &'static str {
        match self {
            Lane::Normal => "normal",
            Lane::Retry => "retry",
        }
    }
}

/// Handle for controlling a running worker pool.
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: JoinSet<()>,
}

impl WorkerHandle {
    /// Signal shutdown and wait for pollers to stop.
    ///
    /// In-flight pipeline executions run to completion; only future ticks
    /// are cancelled, so this waits at most one slowest-pipeline grace
    /// window.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                error!(error = ?e, "Worker task panicked");
            }
        }
        info!(
            subsystem = "jobs",
            component = "worker",
            "Worker pool stopped"
        );
    }
}

/// Bounded-concurrency scheduler running pollers against the queue.
pub struct WorkerPool {
    queue: Arc<dyn QueueRepository>,
    pipeline: Arc<TaskPipeline>,
    config: WorkerPoolConfig,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    /// Create a new worker pool.
    ///
    /// The semaphore limiting concurrent pipeline executions is owned here
    /// and handed to every poller; it is in-process only — cross-process
    /// exclusion comes entirely from the store's claim semantics.
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        pipeline: Arc<TaskPipeline>,
        config: WorkerPoolConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            queue,
            pipeline,
            config,
            semaphore,
        }
    }

    /// Start the pollers and reclaimer; returns a handle for shutdown.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();

        if !self.config.enabled {
            info!(
                subsystem = "jobs",
                component = "worker",
                "Worker pool is disabled, not starting"
            );
            return WorkerHandle { shutdown_tx, tasks };
        }

        info!(
            subsystem = "jobs",
            component = "worker",
            normal_pollers = self.config.normal_pollers,
            retry_pollers = self.config.retry_pollers,
            max_concurrent = self.config.max_concurrent,
            poll_interval_ms = self.config.poll_interval_ms,
            "Worker pool started"
        );

        let pool = Arc::new(self);

        for worker_id in 1..=pool.config.normal_pollers {
            let pool = pool.clone();
            let rx = shutdown_rx.clone();
            tasks.spawn(async move { pool.poller(Lane::Normal, worker_id, rx).await });
        }

        for worker_id in 1..=pool.config.retry_pollers {
            let pool = pool.clone();
            let rx = shutdown_rx.clone();
            tasks.spawn(async move { pool.poller(Lane::Retry, worker_id, rx).await });
        }

        {
            let pool = pool.clone();
            let rx = shutdown_rx.clone();
            tasks.spawn(async move { pool.reclaimer(rx).await });
        }

        WorkerHandle { shutdown_tx, tasks }
    }

    /// Fixed-interval poll loop for one lane.
    async fn poller(&self, lane: Lane, worker_id: usize, mut shutdown_rx: watch::Receiver<bool>) {
        let interval = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(
            subsystem = "jobs",
            component = "worker",
            lane = lane.as_str(),
            worker_id,
            "Poller started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!(
                        subsystem = "jobs",
                        component = "worker",
                        lane = lane.as_str(),
                        worker_id,
                        "Poller received shutdown signal"
                    );
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(lane, worker_id).await;
                }
            }
        }
    }

    /// One claim-and-process attempt.
    async fn tick(&self, lane: Lane, worker_id: usize) {
        // Saturated ceiling: skip the tick without queuing or blocking.
        let _permit = match self.semaphore.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                trace!(
                    subsystem = "jobs",
                    component = "worker",
                    lane = lane.as_str(),
                    worker_id,
                    "Concurrency ceiling reached, skipping tick"
                );
                return;
            }
        };

        let claimed = match lane {
            Lane::Normal => self.queue.claim_ready().await,
            Lane::Retry => self.queue.claim_failed_for_retry(self.config.max_retries).await,
        };

        match claimed {
            Ok(Some(entry)) => {
                debug!(
                    subsystem = "jobs",
                    component = "worker",
                    lane = lane.as_str(),
                    worker_id,
                    entry_id = %entry.id,
                    retries = entry.retries,
                    "Processing claimed entry"
                );
                // The pipeline has already recorded the failure; nothing
                // further to do with the error here.
                let _ = self.pipeline.execute(&entry).await;
            }
            Ok(None) => {
                trace!(
                    subsystem = "jobs",
                    component = "worker",
                    lane = lane.as_str(),
                    worker_id,
                    "No entry available"
                );
            }
            Err(err) => {
                error!(
                    subsystem = "jobs",
                    component = "worker",
                    lane = lane.as_str(),
                    worker_id,
                    error = %err,
                    "Failed to claim entry"
                );
            }
        }
    }

    /// Periodic recovery pass reverting abandoned processing entries.
    async fn reclaimer(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.reclaim_interval_secs.max(1));
        let timeout = Duration::from_secs(self.config.stuck_timeout_secs);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(
            subsystem = "jobs",
            component = "worker",
            stuck_timeout_secs = self.config.stuck_timeout_secs,
            "Reclaimer started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!(
                        subsystem = "jobs",
                        component = "worker",
                        "Reclaimer received shutdown signal"
                    );
                    break;
                }
                _ = ticker.tick() => {
                    match self.queue.reclaim_stuck(timeout).await {
                        Ok(0) => {}
                        Ok(count) => {
                            warn!(
                                subsystem = "jobs",
                                component = "worker",
                                op = "reclaim_stuck",
                                reclaimed = count,
                                "Reverted stuck entries to ready"
                            );
                        }
                        Err(err) => {
                            error!(
                                subsystem = "jobs",
                                component = "worker",
                                op = "reclaim_stuck",
                                error = %err,
                                "Reclaim pass failed"
                            );
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.normal_pollers, 2);
        assert_eq!(config.retry_pollers, 1);
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.stuck_timeout_secs, 300);
        assert!(config.enabled);
    }

    #[test]
    fn test_config_builder() {
        let config = WorkerPoolConfig::default()
            .with_normal_pollers(4)
            .with_retry_pollers(2)
            .with_max_concurrent(8)
            .with_poll_interval(250)
            .with_max_retries(5)
            .with_stuck_timeout(600)
            .with_reclaim_interval(30)
            .with_enabled(false);

        assert_eq!(config.normal_pollers, 4);
        assert_eq!(config.retry_pollers, 2);
        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.stuck_timeout_secs, 600);
        assert_eq!(config.reclaim_interval_secs, 30);
        assert!(!config.enabled);
    }

    #[test]
    fn test_config_builder_order_independence() {
        let config1 = WorkerPoolConfig::default()
            .with_enabled(false)
            .with_max_concurrent(10)
            .with_poll_interval(3000);

        let config2 = WorkerPoolConfig::default()
            .with_poll_interval(3000)
            .with_enabled(false)
            .with_max_concurrent(10);

        assert_eq!(config1.poll_interval_ms, config2.poll_interval_ms);
        assert_eq!(config1.max_concurrent, config2.max_concurrent);
        assert_eq!(config1.enabled, config2.enabled);
    }

    #[test]
    fn test_lane_labels() {
        assert_eq!(Lane::Normal.as_str(), "normal");
        assert_eq!(Lane::Retry.as_str(), "retry");
    }
}
