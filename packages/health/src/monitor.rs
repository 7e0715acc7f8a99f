//! Generation-aware health monitor.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use toponym_map_surface::{ActivityReporter, Generation, SuccessKind};

use crate::{Fault, HealthError, HealthStatus, MapHealthState};

/// Shared health state of one map shell.
///
/// Every report carries the [`Generation`] of the surface it came from.
/// The current generation is the attempt number, so reports from an
/// instance torn down by a retry are dropped.
pub struct HealthMonitor {
    state: Mutex<MapHealthState>,
    status: watch::Sender<HealthStatus>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("state", &self.snapshot())
            .finish()
    }
}

impl HealthMonitor {
    /// A healthy monitor for attempt 0.
    #[must_use]
    pub fn new() -> Self {
        let (status, _) = watch::channel(HealthStatus::Healthy);
        Self {
            state: Mutex::new(MapHealthState::new(Instant::now())),
            status,
        }
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> MapHealthState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        *self.status.borrow()
    }

    /// Generation of the instance that is currently allowed to report.
    #[must_use]
    pub fn current_generation(&self) -> Generation {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Generation::new(u64::from(state.attempt()))
    }

    /// Subscribes to status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.status.subscribe()
    }

    /// Records qualifying activity from `generation`.
    ///
    /// Returns `true` if the activity clock was reset.
    pub fn record_activity(&self, generation: Generation) -> bool {
        self.update(generation, |state| state.record_activity(Instant::now()))
            .unwrap_or(false)
    }

    /// Reports a lifecycle fault from `generation`.
    ///
    /// Returns `true` if this report moved the map to `Errored`.
    pub fn report_fault(&self, generation: Generation, fault: Fault) -> bool {
        let message = fault.to_string();
        let escalated = self
            .update(generation, |state| state.report_fault(fault))
            .unwrap_or(false);
        if escalated {
            log::warn!("Map generation {generation} errored: {message}");
        }
        escalated
    }

    /// Handles the ready signal of `generation`, completing a pending
    /// recovery.
    pub fn surface_ready(&self, generation: Generation) {
        let now = Instant::now();
        self.update(generation, |state| {
            if state.status() == HealthStatus::Recovering {
                if state.mark_mounted(now).is_ok() {
                    log::info!("Map recovered on attempt {}", state.attempt());
                }
            } else {
                state.record_activity(now);
            }
        });
    }

    /// Escalates to `Errored` if the current instance has been idle for
    /// `timeout`.
    ///
    /// Returns `true` if this check caused the transition.
    pub fn check_inactivity(&self, timeout: Duration) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let escalated = state.check_inactivity(now, timeout);
        if escalated {
            log::warn!(
                "No map activity for {:?}; marking map generation {} as errored",
                now.saturating_duration_since(state.last_activity()),
                state.attempt()
            );
        }
        self.publish(&state);
        escalated
    }

    /// Starts a user-initiated recovery and returns the generation the
    /// fresh instance must be mounted with.
    ///
    /// # Errors
    ///
    /// Returns [`HealthError::InvalidTransition`] unless `Errored`.
    pub fn begin_retry(&self) -> Result<Generation, HealthError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let attempt = state.begin_retry(Instant::now())?;
        log::info!("Retrying map, attempt {attempt}");
        self.publish(&state);
        Ok(Generation::new(u64::from(attempt)))
    }

    fn update<T>(
        &self,
        generation: Generation,
        apply: impl FnOnce(&mut MapHealthState) -> T,
    ) -> Option<T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if u64::from(state.attempt()) != generation.value() {
            log::debug!(
                "Ignoring report from stale map generation {generation} (current {})",
                state.attempt()
            );
            return None;
        }
        let result = apply(&mut state);
        self.publish(&state);
        Some(result)
    }

    fn publish(&self, state: &MapHealthState) {
        self.status.send_if_modified(|status| {
            let changed = *status != state.status();
            *status = state.status();
            changed
        });
    }
}

impl ActivityReporter for HealthMonitor {
    fn record_success(&self, generation: Generation, kind: SuccessKind) {
        if self.record_activity(generation) {
            log::trace!("Map {kind} succeeded on generation {generation}");
        }
    }
}
