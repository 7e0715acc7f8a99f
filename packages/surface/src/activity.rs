//! Reporting of confirmed successful map operations.
//!
//! Camera-driving components report through [`ActivityReporter`] after a
//! command sequence completed, which is what keeps the health watchdog
//! from escalating. The reporter is decoupled from the health monitor so
//! components can run headless with [`NullReporter`].

use std::sync::Arc;

use strum_macros::{AsRefStr, Display};

use crate::Generation;

/// Kind of operation that completed successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SuccessKind {
    /// A viewport was fitted to a toponym's geometry.
    ViewportFit,
    /// A marker focus sequence completed.
    Focus,
    /// A cluster's member bounds were framed.
    ClusterFit,
    /// A marker or shape layer was rendered.
    Render,
}

/// Receives confirmed successes tagged with the surface generation they
/// happened on.
pub trait ActivityReporter: Send + Sync {
    /// Records that `kind` completed on surface `generation`.
    fn record_success(&self, generation: Generation, kind: SuccessKind);
}

/// An [`ActivityReporter`] that ignores every report.
pub struct NullReporter;

impl ActivityReporter for NullReporter {
    fn record_success(&self, _generation: Generation, _kind: SuccessKind) {}
}

/// Returns a shared [`NullReporter`] instance for convenient use.
#[must_use]
pub fn null_reporter() -> Arc<dyn ActivityReporter> {
    Arc::new(NullReporter)
}
