//! The map health state machine.
//!
//! ```text
//! Healthy ──fault / inactivity──▶ Errored ──retry──▶ Recovering ──mounted──▶ Healthy
//! ```
//!
//! Leaving `Errored` always takes an explicit retry. Activity is only
//! tracked outside `Errored` and never clears an error.

use std::time::Duration;

use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::time::Instant;

use crate::HealthError;

/// Coarse health of the wrapped map.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthStatus {
    /// The map is (or is becoming) usable.
    Healthy,
    /// A fault was detected; waiting for the user to retry.
    Errored,
    /// A fresh instance is being mounted after a retry.
    Recovering,
}

/// Why the map entered `Errored`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The surface's own lifecycle reported an error.
    Lifecycle(String),
    /// No qualifying activity for `idle`.
    Inactivity {
        /// Time since the last activity when the watchdog fired.
        idle: Duration,
    },
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lifecycle(message) => write!(f, "The map failed: {message}"),
            Self::Inactivity { idle } => write!(
                f,
                "The map stopped responding ({}s without activity)",
                idle.as_secs()
            ),
        }
    }
}

/// Health bookkeeping for one wrapped map.
#[derive(Debug, Clone)]
pub struct MapHealthState {
    status: HealthStatus,
    last_activity: Instant,
    fault: Option<Fault>,
    attempt: u32,
}

impl MapHealthState {
    /// A healthy state whose activity clock starts at `now`.
    #[must_use]
    pub const fn new(now: Instant) -> Self {
        Self {
            status: HealthStatus::Healthy,
            last_activity: now,
            fault: None,
            attempt: 0,
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> HealthStatus {
        self.status
    }

    /// Number of user-initiated retries so far; the remount key.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The fault that caused `Errored`, if errored.
    #[must_use]
    pub const fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// When qualifying activity was last observed.
    #[must_use]
    pub const fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Records qualifying activity. Ignored while `Errored`.
    ///
    /// Returns `true` if the activity clock was reset.
    pub fn record_activity(&mut self, now: Instant) -> bool {
        if self.status == HealthStatus::Errored {
            return false;
        }
        self.last_activity = now;
        true
    }

    /// Enters `Errored` because of `fault`.
    ///
    /// Returns `false` if already errored; the first fault is kept.
    pub fn report_fault(&mut self, fault: Fault) -> bool {
        if self.status == HealthStatus::Errored {
            return false;
        }
        self.status = HealthStatus::Errored;
        self.fault = Some(fault);
        true
    }

    /// Enters `Errored` if nothing happened for at least `timeout`.
    ///
    /// Returns `true` if this call caused the transition.
    pub fn check_inactivity(&mut self, now: Instant, timeout: Duration) -> bool {
        if self.status == HealthStatus::Errored {
            return false;
        }
        let idle = now.saturating_duration_since(self.last_activity);
        if idle < timeout {
            return false;
        }
        self.report_fault(Fault::Inactivity { idle })
    }

    /// Starts a user-initiated recovery and returns the new attempt
    /// number.
    ///
    /// # Errors
    ///
    /// Returns [`HealthError::InvalidTransition`] unless `Errored`.
    pub fn begin_retry(&mut self, now: Instant) -> Result<u32, HealthError> {
        if self.status != HealthStatus::Errored {
            return Err(HealthError::InvalidTransition {
                from: self.status,
                action: "retry",
            });
        }
        self.status = HealthStatus::Recovering;
        self.fault = None;
        self.attempt += 1;
        self.last_activity = now;
        Ok(self.attempt)
    }

    /// Completes a recovery once the fresh instance is mounted.
    ///
    /// # Errors
    ///
    /// Returns [`HealthError::InvalidTransition`] unless `Recovering`.
    pub fn mark_mounted(&mut self, now: Instant) -> Result<(), HealthError> {
        if self.status != HealthStatus::Recovering {
            return Err(HealthError::InvalidTransition {
                from: self.status,
                action: "mount",
            });
        }
        self.status = HealthStatus::Healthy;
        self.last_activity = now;
        Ok(())
    }
}
