//! Periodic scheduling passes
//!
//! Runs one pass immediately and then one per check interval until shutdown
//! is requested. Passes never overlap: the next tick is only awaited after
//! the previous pass returned.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use certwarden_common::ExecutionMode;

use crate::engine::PassScheduler;

/// Default check interval (24 hours)
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Minimum check interval (1 hour)
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// Background scheduling loop
pub struct ScheduleLoop {
    scheduler: PassScheduler,
    check_interval: Duration,
}

impl ScheduleLoop {
    pub fn new(scheduler: PassScheduler) -> Self {
        Self {
            scheduler,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    /// Set the check interval
    ///
    /// The interval is clamped to a minimum of 1 hour.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if interval < MIN_CHECK_INTERVAL {
            warn!(
                requested_secs = interval.as_secs(),
                "Check interval below minimum, using 1 hour"
            );
        }
        self.check_interval = interval.max(MIN_CHECK_INTERVAL);
        self
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Run passes until `shutdown` resolves
    ///
    /// A pass in progress is finished before shutdown is honoured. Returns
    /// the number of passes run.
    pub async fn run_until<F>(self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        info!(
            check_interval_hours = self.check_interval.as_secs() / 3600,
            "Starting scheduling loop"
        );

        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut passes = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(passes = passes, "Shutdown requested, stopping scheduling loop");
                    break;
                }
                _ = ticker.tick() => {
                    debug!("Running scheduled pass");
                    let start = Instant::now();
                    match self.scheduler.run(ExecutionMode::Live).await {
                        Ok(report) if report.is_clean() => {
                            info!(elapsed_ms = start.elapsed().as_millis(), "{}", report);
                        }
                        Ok(report) => {
                            warn!(elapsed_ms = start.elapsed().as_millis(), "{}", report);
                        }
                        Err(e) => {
                            error!(error = %e, "Scheduling pass failed, retrying next interval");
                        }
                    }
                    passes += 1;
                }
            }
        }

        passes
    }
}

impl fmt::Debug for ScheduleLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleLoop")
            .field("check_interval", &self.check_interval)
            .finish_non_exhaustive()
    }
}

/// Resolves on SIGINT, or SIGTERM on Unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
