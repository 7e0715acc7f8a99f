//! Two-phase camera focus on a marker.
//!
//! Phase 1 zooms in to the floor level when the map is below it and
//! waits for the surface's `ZoomEnd`. Phase 2 pans so the target clears
//! the fixed overlay at the top of the screen. Each activation aborts the
//! previous sequence; an aborted sequence never pans.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::{AbortHandle, JoinHandle};
use toponym_map_geometry_models::{LatLng, Viewport};
use toponym_map_surface::{
    ActivityReporter, Generation, GenerationCounter, PanPadding, SuccessKind, SurfaceError,
    SurfaceEvent, SurfaceHandle, wait_until_ready,
};
use toponym_map_viewport::ViewportFitter;

use crate::ClusterNode;

/// Zoom a focused marker is brought to at least.
pub const DEFAULT_FLOOR_ZOOM: f64 = 14.0;
/// Margin kept below the focused marker.
pub const DEFAULT_BOTTOM_MARGIN_PX: u32 = 24;
/// How long to wait for a zoom animation to finish.
pub const DEFAULT_ZOOM_TIMEOUT_MS: u64 = 2_000;
/// How long to wait for the surface to become ready.
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 10_000;

/// Focus sequence configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusOptions {
    /// Minimum zoom after focusing.
    pub floor_zoom: f64,
    /// Bottom pan margin in pixels.
    pub bottom_margin_px: u32,
    /// Zoom animation timeout in milliseconds.
    pub zoom_timeout_ms: u64,
    /// Readiness gate timeout in milliseconds.
    pub ready_timeout_ms: u64,
}

impl Default for FocusOptions {
    fn default() -> Self {
        Self {
            floor_zoom: DEFAULT_FLOOR_ZOOM,
            bottom_margin_px: DEFAULT_BOTTOM_MARGIN_PX,
            zoom_timeout_ms: DEFAULT_ZOOM_TIMEOUT_MS,
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
        }
    }
}

/// A request to bring `target` into clear view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterFocusRequest {
    /// Coordinate to focus.
    pub target: LatLng,
    /// Height of the fixed overlay covering the top of the map.
    pub overlay_height_px: u32,
}

/// How an activation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusOutcome {
    /// The marker was panned into view, after zooming in if `zoomed`.
    Completed {
        /// Whether phase 1 ran.
        zoomed: bool,
    },
    /// A cluster's member bounds were framed.
    ClusterFramed,
    /// The zoom animation never reported completion; no pan was issued.
    Abandoned,
    /// A newer activation took over before the pan.
    Superseded,
}

/// Runs focus sequences against one mounted surface.
pub struct FocusCoordinator {
    handle: SurfaceHandle,
    fitter: ViewportFitter,
    options: FocusOptions,
    reporter: Arc<dyn ActivityReporter>,
    sequences: Arc<GenerationCounter>,
    current: Mutex<Option<AbortHandle>>,
}

impl std::fmt::Debug for FocusCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusCoordinator")
            .field("handle", &self.handle)
            .field("options", &self.options)
            .field("sequence", &self.sequences.current())
            .finish_non_exhaustive()
    }
}

impl FocusCoordinator {
    /// Creates a coordinator for the surface behind `handle`.
    #[must_use]
    pub fn new(
        handle: SurfaceHandle,
        fitter: ViewportFitter,
        options: FocusOptions,
        reporter: Arc<dyn ActivityReporter>,
    ) -> Self {
        Self {
            handle,
            fitter,
            options,
            reporter,
            sequences: Arc::new(GenerationCounter::new()),
            current: Mutex::new(None),
        }
    }

    /// Activates a rendered node: clusters are framed, single markers
    /// focused.
    pub fn activate(
        &self,
        node: &ClusterNode,
        overlay_height_px: u32,
    ) -> JoinHandle<Result<FocusOutcome, SurfaceError>> {
        match node {
            ClusterNode::Single(marker) => self.focus(ClusterFocusRequest {
                target: marker.position,
                overlay_height_px,
            }),
            ClusterNode::Cluster { bounds, .. } => {
                let handle = self.handle.clone();
                let fitter = self.fitter.clone();
                let reporter = Arc::clone(&self.reporter);
                let viewport = Viewport::BoundsView {
                    bounds: *bounds,
                    padding_px: fitter.options().padding_px,
                };
                self.start(move |_| async move {
                    fitter.apply(&handle, viewport).await?;
                    reporter.record_success(handle.generation(), SuccessKind::ClusterFit);
                    Ok(FocusOutcome::ClusterFramed)
                })
            }
        }
    }

    /// Starts the two-phase focus sequence for `request`, aborting any
    /// sequence still running.
    pub fn focus(&self, request: ClusterFocusRequest) -> JoinHandle<Result<FocusOutcome, SurfaceError>> {
        let handle = self.handle.clone();
        let options = self.options.clone();
        let reporter = Arc::clone(&self.reporter);
        let sequences = Arc::clone(&self.sequences);

        self.start(move |sequence| async move {
            let outcome = run_focus(&handle, &options, request, sequence, &sequences).await?;
            if matches!(outcome, FocusOutcome::Completed { .. }) {
                reporter.record_success(handle.generation(), SuccessKind::Focus);
            }
            Ok(outcome)
        })
    }

    /// Aborts the running sequence, if any.
    pub fn cancel(&self) {
        self.sequences.advance();
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn start<F, Fut>(&self, sequence: F) -> JoinHandle<Result<FocusOutcome, SurfaceError>>
    where
        F: FnOnce(Generation) -> Fut,
        Fut: Future<Output = Result<FocusOutcome, SurfaceError>> + Send + 'static,
    {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.take() {
            log::debug!("Aborting previous focus sequence");
            previous.abort();
        }

        let task = tokio::spawn(sequence(self.sequences.advance()));
        *current = Some(task.abort_handle());
        task
    }
}

async fn run_focus(
    handle: &SurfaceHandle,
    options: &FocusOptions,
    request: ClusterFocusRequest,
    sequence: Generation,
    sequences: &GenerationCounter,
) -> Result<FocusOutcome, SurfaceError> {
    wait_until_ready(
        handle.surface().as_ref(),
        Duration::from_millis(options.ready_timeout_ms),
    )
    .await?;

    let camera = handle.camera().await?;
    let mut events = camera.subscribe();

    let zoomed = camera.zoom() < options.floor_zoom;
    if zoomed {
        camera.animate_zoom(options.floor_zoom, request.target)?;
        let zoom_end = tokio::time::timeout(
            Duration::from_millis(options.zoom_timeout_ms),
            wait_for_zoom_end(&mut events, camera.generation()),
        )
        .await;

        match zoom_end {
            Ok(result) => result?,
            Err(_) => {
                log::warn!(
                    "Zoom to {} did not finish within {} ms; abandoning focus",
                    options.floor_zoom,
                    options.zoom_timeout_ms
                );
                return Ok(FocusOutcome::Abandoned);
            }
        }
    }

    if !sequences.is_current(sequence) {
        return Ok(FocusOutcome::Superseded);
    }

    camera.pan_inside(
        request.target,
        PanPadding::vertical(request.overlay_height_px, options.bottom_margin_px),
    )?;
    Ok(FocusOutcome::Completed { zoomed })
}

async fn wait_for_zoom_end(
    events: &mut broadcast::Receiver<SurfaceEvent>,
    generation: Generation,
) -> Result<(), SurfaceError> {
    loop {
        match events.recv().await {
            Ok(SurfaceEvent::ZoomEnd) => return Ok(()),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::debug!("Focus sequence skipped {skipped} surface events");
            }
            Err(broadcast::error::RecvError::Closed) => {
                return Err(SurfaceError::Detached { generation });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use toponym_map_geometry_models::BoundingBox;
    use toponym_map_surface::{RecordingSurface, SurfaceCommand, null_reporter};

    use super::*;
    use crate::Marker;

    const TARGET: LatLng = LatLng::new(49.1951, 16.6068);
    const OVERLAY_PX: u32 = 180;

    fn coordinator(surface: &Arc<RecordingSurface>, reporter: Arc<dyn ActivityReporter>) -> FocusCoordinator {
        FocusCoordinator::new(
            SurfaceHandle::new(surface.clone()),
            ViewportFitter::default(),
            FocusOptions::default(),
            reporter,
        )
    }

    fn request(target: LatLng) -> ClusterFocusRequest {
        ClusterFocusRequest {
            target,
            overlay_height_px: OVERLAY_PX,
        }
    }

    async fn wait_for_commands(surface: &RecordingSurface, count: usize) {
        while surface.commands().len() < count {
            tokio::task::yield_now().await;
        }
    }

    #[derive(Default)]
    struct CountingReporter(AtomicUsize);

    impl ActivityReporter for CountingReporter {
        fn record_success(&self, _generation: Generation, _kind: SuccessKind) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn pans_only_after_zoom_end_when_below_floor() {
        let surface = RecordingSurface::ready(Generation::new(1));
        surface.set_zoom_silently(10.0);
        surface.set_auto_complete_animations(false);
        let reporter = Arc::new(CountingReporter::default());
        let coordinator = coordinator(&surface, reporter.clone());

        let task = coordinator.focus(request(TARGET));
        wait_for_commands(&surface, 1).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            surface.commands(),
            vec![SurfaceCommand::AnimateZoom {
                zoom: DEFAULT_FLOOR_ZOOM,
                around: TARGET,
            }]
        );

        surface.complete_zoom();
        assert_eq!(
            task.await.unwrap(),
            Ok(FocusOutcome::Completed { zoomed: true })
        );
        assert_eq!(
            surface.commands()[1],
            SurfaceCommand::PanInside {
                target: TARGET,
                padding: PanPadding::vertical(OVERLAY_PX, DEFAULT_BOTTOM_MARGIN_PX),
            }
        );
        assert_eq!(reporter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skips_zoom_when_already_at_floor() {
        let surface = RecordingSurface::ready(Generation::new(1));
        surface.set_zoom_silently(DEFAULT_FLOOR_ZOOM);
        let coordinator = coordinator(&surface, null_reporter());

        let outcome = coordinator.focus(request(TARGET)).await.unwrap();
        assert_eq!(outcome, Ok(FocusOutcome::Completed { zoomed: false }));
        assert_eq!(
            surface.commands(),
            vec![SurfaceCommand::PanInside {
                target: TARGET,
                padding: PanPadding::vertical(OVERLAY_PX, DEFAULT_BOTTOM_MARGIN_PX),
            }]
        );
    }

    #[tokio::test]
    async fn new_activation_aborts_the_pending_sequence() {
        let surface = RecordingSurface::ready(Generation::new(1));
        surface.set_zoom_silently(10.0);
        surface.set_auto_complete_animations(false);
        let coordinator = coordinator(&surface, null_reporter());

        let first = coordinator.focus(request(TARGET));
        wait_for_commands(&surface, 1).await;

        let other = LatLng::new(49.2, 16.61);
        let second = coordinator.focus(request(other));

        assert!(first.await.unwrap_err().is_cancelled());
        assert_eq!(
            second.await.unwrap(),
            Ok(FocusOutcome::Completed { zoomed: false })
        );

        let pans: Vec<_> = surface
            .commands()
            .into_iter()
            .filter(|command| matches!(command, SurfaceCommand::PanInside { .. }))
            .collect();
        assert_eq!(
            pans,
            vec![SurfaceCommand::PanInside {
                target: other,
                padding: PanPadding::vertical(OVERLAY_PX, DEFAULT_BOTTOM_MARGIN_PX),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_zoom_end_abandons_without_panning() {
        let surface = RecordingSurface::ready(Generation::new(1));
        surface.set_zoom_silently(9.0);
        surface.set_auto_complete_animations(false);
        let coordinator = coordinator(&surface, null_reporter());

        let outcome = coordinator.focus(request(TARGET)).await.unwrap();
        assert_eq!(outcome, Ok(FocusOutcome::Abandoned));
        assert_eq!(surface.commands().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn activating_a_cluster_frames_its_bounds() {
        let surface = RecordingSurface::ready(Generation::new(1));
        let coordinator = coordinator(&surface, null_reporter());
        let bounds = BoundingBox::new(49.19, 49.20, 16.60, 16.61);
        let node = ClusterNode::Cluster {
            members: vec![
                Marker {
                    id: 1,
                    position: LatLng::new(49.19, 16.60),
                    label: "a".to_string(),
                },
                Marker {
                    id: 2,
                    position: LatLng::new(49.20, 16.61),
                    label: "b".to_string(),
                },
            ],
            centroid: bounds.center(),
            bounds,
        };

        let outcome = coordinator.activate(&node, OVERLAY_PX).await.unwrap();
        assert_eq!(outcome, Ok(FocusOutcome::ClusterFramed));
        assert_eq!(
            surface.commands(),
            vec![SurfaceCommand::FitBounds {
                bounds,
                padding_px: 20,
            }]
        );
    }

    #[tokio::test]
    async fn unready_surface_refuses_focus() {
        let surface = RecordingSurface::new(Generation::new(1));
        let coordinator = FocusCoordinator::new(
            SurfaceHandle::new(surface.clone()),
            ViewportFitter::default(),
            FocusOptions {
                ready_timeout_ms: 10,
                ..FocusOptions::default()
            },
            null_reporter(),
        );
        let outcome = coordinator.focus(request(TARGET)).await.unwrap();
        assert!(matches!(outcome, Err(SurfaceError::ReadyTimeout { .. })));
        assert!(surface.commands().is_empty());
    }
}
