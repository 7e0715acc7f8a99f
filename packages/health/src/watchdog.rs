//! Inactivity watchdog.
//!
//! Polls the [`HealthMonitor`] on a fixed interval and escalates to
//! `Errored` once no qualifying activity has been seen for the
//! inactivity timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::HealthMonitor;

/// How long the map may stay silent before it is considered frozen.
pub const DEFAULT_INACTIVITY_TIMEOUT_MS: u64 = 30_000;

/// How often the watchdog checks.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Background inactivity checker.
///
/// Stops when [`Watchdog::stop`] is called or the handle is dropped.
pub struct Watchdog {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Watchdog {
    /// Spawns the polling loop for `monitor`.
    #[must_use]
    pub fn spawn(monitor: Arc<HealthMonitor>, timeout: Duration, poll_interval: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(monitor, timeout, poll_interval, shutdown.clone()));
        Self { shutdown, task }
    }

    /// Whether the loop is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the polling loop.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run(
    monitor: Arc<HealthMonitor>,
    timeout: Duration,
    poll_interval: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    log::debug!("Map watchdog started (timeout {timeout:?}, poll {poll_interval:?})");

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {
                monitor.check_inactivity(timeout);
            }
        }
    }

    log::debug!("Map watchdog stopped");
}
