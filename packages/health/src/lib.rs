#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Map health monitoring and remount-based recovery.
//!
//! [`MapShell`] owns the mounted map surface. A [`HealthMonitor`] tracks
//! its lifecycle errors and qualifying activity, and a [`Watchdog`]
//! escalates prolonged inactivity to an error. Recovery is always
//! user-initiated: [`MapShell::retry`] drops the failed instance
//! wholesale and mounts a fresh one keyed by the new attempt number.

pub mod monitor;
pub mod shell;
pub mod state;
pub mod watchdog;

use thiserror::Error;
use toponym_map_surface::SurfaceError;

pub use monitor::HealthMonitor;
pub use shell::{HealthOptions, MapShell, ShellView, SurfaceFactory, retry_label};
pub use state::{Fault, HealthStatus, MapHealthState};
pub use watchdog::Watchdog;

/// Errors from the health layer.
#[derive(Debug, Error)]
pub enum HealthError {
    /// The requested action is not valid in the current status.
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        /// Status the action was attempted from.
        from: HealthStatus,
        /// The rejected action.
        action: &'static str,
    },

    /// Mounting a fresh surface failed.
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}
