#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The interactive map surface as seen by the engine.
//!
//! The surface is a single mutable resource owned by the recovery
//! wrapper. Components talk to it through the [`MapSurface`] port, gate
//! every camera command on [`wait_until_ready`], and serialize camera
//! access through the lease handed out by [`SurfaceHandle::camera`].
//!
//! Every mounted instance carries a [`Generation`]. Anything tagged with
//! a generation other than the current one is stale and must be
//! ignored. Once the owner detaches a [`SurfaceHandle`], every clone of
//! it refuses commands with [`SurfaceError::Detached`].

pub mod activity;
pub mod generation;
pub mod recording;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{OwnedMutexGuard, broadcast};
use toponym_map_geometry_models::{BoundingBox, GeometryResult, LatLng};

pub use activity::{ActivityReporter, NullReporter, SuccessKind, null_reporter};
pub use generation::{Generation, GenerationCounter};
pub use recording::{RecordingSurface, SurfaceCommand};

/// Errors raised by surface commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// A command was issued before the surface signalled readiness.
    #[error("map surface is not ready")]
    NotReady,

    /// The surface did not become ready within the allowed time.
    #[error("map surface did not become ready within {waited_ms} ms")]
    ReadyTimeout {
        /// How long the gate waited.
        waited_ms: u64,
    },

    /// The surface was torn down while someone was waiting on it.
    #[error("map surface generation {generation} was detached")]
    Detached {
        /// Generation of the detached instance.
        generation: Generation,
    },

    /// The rendering backend rejected a command.
    #[error("map surface error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

/// Lifecycle and interaction events emitted by a surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SurfaceEvent {
    /// The surface finished initializing and was mounted.
    Ready,
    /// An animated zoom finished.
    ZoomEnd,
    /// A camera move finished.
    MoveEnd,
    /// The center changed; emitted on every move step.
    Moved {
        /// New map center.
        center: LatLng,
    },
    /// Raw pointer movement or click over the map.
    Pointer,
    /// Internal map activity (tile load, redraw).
    Activity,
    /// The surface's own lifecycle reported a failure.
    Error {
        /// Description of the failure.
        message: String,
    },
}

/// Pixel margins a pan must keep the target clear of.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanPadding {
    /// Top margin in pixels.
    pub top_px: u32,
    /// Bottom margin in pixels.
    pub bottom_px: u32,
    /// Left margin in pixels.
    pub left_px: u32,
    /// Right margin in pixels.
    pub right_px: u32,
}

impl PanPadding {
    /// Padding with only vertical margins.
    #[must_use]
    pub const fn vertical(top_px: u32, bottom_px: u32) -> Self {
        Self {
            top_px,
            bottom_px,
            left_px: 0,
            right_px: 0,
        }
    }
}

/// One item of a cluster-ready marker list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MarkerGlyph {
    /// A single toponym marker.
    Single {
        /// Toponym id.
        id: i64,
        /// Marker position.
        position: LatLng,
        /// Display label.
        label: String,
    },
    /// Several nearby markers rendered as one unit.
    Cluster {
        /// Number of markers in the cluster.
        count: usize,
        /// Position the cluster badge is drawn at.
        position: LatLng,
        /// Bounds of the member markers.
        bounds: BoundingBox,
    },
}

/// Port to the interactive map surface.
///
/// Commands never suspend. Completion of animated moves is reported
/// through [`SurfaceEvent`]s on the [`MapSurface::subscribe`] channel.
pub trait MapSurface: Send + Sync {
    /// Generation of this mounted instance.
    fn generation(&self) -> Generation;

    /// Whether the surface has been initialized and mounted.
    fn is_ready(&self) -> bool;

    /// Current zoom level.
    fn zoom(&self) -> f64;

    /// Current map center.
    fn center(&self) -> LatLng;

    /// Centers the map on `center` at `zoom` without animation.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] if the surface is not ready or rejects
    /// the command.
    fn set_view(&self, center: LatLng, zoom: f64) -> Result<(), SurfaceError>;

    /// Frames `bounds` with `padding_px` on every side.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] if the surface is not ready or rejects
    /// the command.
    fn fit_bounds(&self, bounds: &BoundingBox, padding_px: u32) -> Result<(), SurfaceError>;

    /// Starts an animated zoom to `zoom` around `around`. Completion is
    /// signalled by [`SurfaceEvent::ZoomEnd`].
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] if the surface is not ready or rejects
    /// the command.
    fn animate_zoom(&self, zoom: f64, around: LatLng) -> Result<(), SurfaceError>;

    /// Animated pan that keeps `target` inside the viewport minus
    /// `padding`.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] if the surface is not ready or rejects
    /// the command.
    fn pan_inside(&self, target: LatLng, padding: PanPadding) -> Result<(), SurfaceError>;

    /// Draws a toponym's geometry, replacing any previous shape.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] if the surface rejects the shape.
    fn render_shape(&self, geometry: &GeometryResult, position: LatLng)
    -> Result<(), SurfaceError>;

    /// Replaces the marker layer with `markers`.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] if the surface rejects the markers.
    fn render_markers(&self, markers: &[MarkerGlyph]) -> Result<(), SurfaceError>;

    /// Subscribes to the surface's event stream.
    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent>;
}

/// Waits until `surface` has signalled [`SurfaceEvent::Ready`].
///
/// Subscribes before checking the ready flag so a `Ready` event emitted
/// in between is not missed.
///
/// # Errors
///
/// Returns [`SurfaceError::ReadyTimeout`] if the surface is not ready
/// within `timeout`, or [`SurfaceError::Detached`] if its event channel
/// closes first.
pub async fn wait_until_ready(
    surface: &dyn MapSurface,
    timeout: Duration,
) -> Result<(), SurfaceError> {
    let mut events = surface.subscribe();
    if surface.is_ready() {
        return Ok(());
    }

    let generation = surface.generation();
    let wait = async {
        loop {
            match events.recv().await {
                Ok(SurfaceEvent::Ready) => return Ok(()),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("Readiness gate skipped {skipped} surface events");
                    if surface.is_ready() {
                        return Ok(());
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(SurfaceError::Detached { generation });
                }
            }
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .unwrap_or_else(|_| {
            Err(SurfaceError::ReadyTimeout {
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })
        })
}

/// Shared handle to the mounted surface plus its camera lease.
///
/// Clones share the same lease, so at most one holder of a
/// [`CameraGuard`] issues camera commands at a time. Clones also share
/// the attachment flag: after [`SurfaceHandle::detach`] the instance is
/// torn down for every holder, including guards already handed out.
#[derive(Clone)]
pub struct SurfaceHandle {
    surface: Arc<dyn MapSurface>,
    attached: Arc<AtomicBool>,
    camera: Arc<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceHandle")
            .field("generation", &self.surface.generation())
            .field("attached", &self.is_attached())
            .field("ready", &self.surface.is_ready())
            .finish_non_exhaustive()
    }
}

impl SurfaceHandle {
    /// Wraps a mounted surface with a fresh camera lease.
    #[must_use]
    pub fn new(surface: Arc<dyn MapSurface>) -> Self {
        let attached = Arc::new(AtomicBool::new(true));
        Self {
            surface: Arc::new(AttachedSurface {
                inner: surface,
                attached: Arc::clone(&attached),
            }),
            attached,
            camera: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// The underlying surface.
    ///
    /// Commands issued through it fail with [`SurfaceError::Detached`]
    /// once the handle is detached.
    #[must_use]
    pub fn surface(&self) -> &Arc<dyn MapSurface> {
        &self.surface
    }

    /// Generation of the wrapped instance.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.surface.generation()
    }

    /// Marks the wrapped instance as torn down for every clone.
    pub fn detach(&self) {
        if self.attached.swap(false, Ordering::AcqRel) {
            log::debug!("Detached map generation {}", self.generation());
        }
    }

    /// Whether the wrapped instance is still the mounted one.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    fn ensure_attached(&self) -> Result<(), SurfaceError> {
        if self.is_attached() {
            Ok(())
        } else {
            Err(SurfaceError::Detached {
                generation: self.generation(),
            })
        }
    }

    /// Acquires the camera lease.
    ///
    /// # Errors
    ///
    /// * [`SurfaceError::Detached`] if the handle was detached before or
    ///   while waiting for the lease
    /// * [`SurfaceError::NotReady`] if the surface is not ready once the
    ///   lease is held
    pub async fn camera(&self) -> Result<CameraGuard, SurfaceError> {
        self.ensure_attached()?;
        let lease = Arc::clone(&self.camera).lock_owned().await;
        self.ensure_attached()?;
        if !self.surface.is_ready() {
            return Err(SurfaceError::NotReady);
        }
        Ok(CameraGuard {
            _lease: lease,
            surface: Arc::clone(&self.surface),
        })
    }
}

/// Forwards to the mounted instance until its handle is detached.
struct AttachedSurface {
    inner: Arc<dyn MapSurface>,
    attached: Arc<AtomicBool>,
}

impl AttachedSurface {
    fn check(&self) -> Result<(), SurfaceError> {
        if self.attached.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(SurfaceError::Detached {
                generation: self.inner.generation(),
            })
        }
    }
}

impl MapSurface for AttachedSurface {
    fn generation(&self) -> Generation {
        self.inner.generation()
    }

    fn is_ready(&self) -> bool {
        self.check().is_ok() && self.inner.is_ready()
    }

    fn zoom(&self) -> f64 {
        self.inner.zoom()
    }

    fn center(&self) -> LatLng {
        self.inner.center()
    }

    fn set_view(&self, center: LatLng, zoom: f64) -> Result<(), SurfaceError> {
        self.check()?;
        self.inner.set_view(center, zoom)
    }

    fn fit_bounds(&self, bounds: &BoundingBox, padding_px: u32) -> Result<(), SurfaceError> {
        self.check()?;
        self.inner.fit_bounds(bounds, padding_px)
    }

    fn animate_zoom(&self, zoom: f64, around: LatLng) -> Result<(), SurfaceError> {
        self.check()?;
        self.inner.animate_zoom(zoom, around)
    }

    fn pan_inside(&self, target: LatLng, padding: PanPadding) -> Result<(), SurfaceError> {
        self.check()?;
        self.inner.pan_inside(target, padding)
    }

    fn render_shape(
        &self,
        geometry: &GeometryResult,
        position: LatLng,
    ) -> Result<(), SurfaceError> {
        self.check()?;
        self.inner.render_shape(geometry, position)
    }

    fn render_markers(&self, markers: &[MarkerGlyph]) -> Result<(), SurfaceError> {
        self.check()?;
        self.inner.render_markers(markers)
    }

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        if self.check().is_ok() {
            return self.inner.subscribe();
        }
        // Closed at once: a detached instance never emits again.
        let (_, events) = broadcast::channel(1);
        events
    }
}

/// Exclusive right to issue camera commands. Released on drop.
pub struct CameraGuard {
    _lease: OwnedMutexGuard<()>,
    surface: Arc<dyn MapSurface>,
}

impl std::ops::Deref for CameraGuard {
    type Target = dyn MapSurface;

    fn deref(&self) -> &Self::Target {
        self.surface.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gate_passes_immediately_when_ready() {
        let surface = RecordingSurface::ready(Generation::default());
        wait_until_ready(surface.as_ref(), Duration::from_millis(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn gate_waits_for_ready_event() {
        let surface = RecordingSurface::new(Generation::default());
        let gate_surface = Arc::clone(&surface);
        let gate = tokio::spawn(async move {
            wait_until_ready(gate_surface.as_ref(), Duration::from_secs(5)).await
        });
        tokio::task::yield_now().await;
        surface.mark_ready();
        assert_eq!(gate.await.unwrap(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn gate_times_out_on_a_surface_that_never_mounts() {
        let surface = RecordingSurface::new(Generation::default());
        let result = wait_until_ready(surface.as_ref(), Duration::from_secs(2)).await;
        assert_eq!(result, Err(SurfaceError::ReadyTimeout { waited_ms: 2000 }));
    }

    #[tokio::test]
    async fn camera_lease_refuses_unready_surface() {
        let surface = RecordingSurface::new(Generation::default());
        let handle = SurfaceHandle::new(surface);
        assert!(matches!(handle.camera().await, Err(SurfaceError::NotReady)));
    }

    #[tokio::test]
    async fn camera_lease_is_exclusive() {
        let surface = RecordingSurface::ready(Generation::default());
        let handle = SurfaceHandle::new(surface);
        let first = handle.camera().await.unwrap();

        let contender = handle.clone();
        let waiting = tokio::spawn(async move { contender.camera().await.map(|_| ()) });
        tokio::task::yield_now().await;
        assert!(!waiting.is_finished());

        drop(first);
        assert_eq!(waiting.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn detached_handles_refuse_every_command() {
        let surface = RecordingSurface::ready(Generation::new(4));
        let handle = SurfaceHandle::new(surface.clone());
        let stale = handle.clone();
        let guard = handle.camera().await.unwrap();

        handle.detach();
        assert!(!stale.is_attached());
        let detached = SurfaceError::Detached {
            generation: Generation::new(4),
        };
        assert_eq!(stale.camera().await.err(), Some(detached.clone()));
        assert_eq!(guard.set_view(LatLng::new(1.0, 1.0), 5.0), Err(detached.clone()));
        assert_eq!(stale.surface().render_markers(&[]), Err(detached.clone()));
        assert_eq!(
            wait_until_ready(stale.surface().as_ref(), Duration::from_secs(5)).await,
            Err(detached)
        );
        assert!(surface.commands().is_empty());
    }
}
