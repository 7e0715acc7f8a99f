//! Headless [`MapSurface`] that records every command it receives.
//!
//! Used by the CLI preview and by tests across the workspace. Camera
//! commands update the recorded center/zoom and emit the same events an
//! interactive map would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;
use toponym_map_geometry_models::{BoundingBox, GeometryResult, LatLng};

use crate::{Generation, MapSurface, MarkerGlyph, PanPadding, SurfaceError, SurfaceEvent};

const EVENT_CAPACITY: usize = 64;
const INITIAL_ZOOM: f64 = 7.0;
const INITIAL_CENTER: LatLng = LatLng::new(49.8, 15.5);

/// A command observed by a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SurfaceCommand {
    /// [`MapSurface::set_view`].
    SetView {
        /// Requested center.
        center: LatLng,
        /// Requested zoom.
        zoom: f64,
    },
    /// [`MapSurface::fit_bounds`].
    FitBounds {
        /// Requested bounds.
        bounds: BoundingBox,
        /// Requested padding.
        padding_px: u32,
    },
    /// [`MapSurface::animate_zoom`].
    AnimateZoom {
        /// Target zoom.
        zoom: f64,
        /// Zoom origin.
        around: LatLng,
    },
    /// [`MapSurface::pan_inside`].
    PanInside {
        /// Point kept in view.
        target: LatLng,
        /// Margins around the view.
        padding: PanPadding,
    },
    /// [`MapSurface::render_shape`].
    RenderShape {
        /// Rendered geometry.
        geometry: GeometryResult,
        /// Toponym position.
        position: LatLng,
    },
    /// [`MapSurface::render_markers`].
    RenderMarkers {
        /// Rendered marker list.
        markers: Vec<MarkerGlyph>,
    },
}

impl SurfaceCommand {
    /// Whether the command moves the camera.
    #[must_use]
    pub const fn is_camera(&self) -> bool {
        matches!(
            self,
            Self::SetView { .. }
                | Self::FitBounds { .. }
                | Self::AnimateZoom { .. }
                | Self::PanInside { .. }
        )
    }
}

#[derive(Debug)]
struct State {
    ready: bool,
    zoom: f64,
    center: LatLng,
    rejection: Option<String>,
    commands: Vec<SurfaceCommand>,
}

/// Headless surface recording its commands.
#[derive(Debug)]
pub struct RecordingSurface {
    generation: Generation,
    events: broadcast::Sender<SurfaceEvent>,
    auto_complete_animations: AtomicBool,
    state: Mutex<State>,
}

impl RecordingSurface {
    /// A surface that still has to signal readiness via
    /// [`RecordingSurface::mark_ready`].
    #[must_use]
    pub fn new(generation: Generation) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            generation,
            events,
            auto_complete_animations: AtomicBool::new(true),
            state: Mutex::new(State {
                ready: false,
                zoom: INITIAL_ZOOM,
                center: INITIAL_CENTER,
                rejection: None,
                commands: Vec::new(),
            }),
        })
    }

    /// A surface that is already mounted and ready.
    #[must_use]
    pub fn ready(generation: Generation) -> Arc<Self> {
        let surface = Self::new(generation);
        surface.lock().ready = true;
        surface
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Broadcasts `event` to every subscriber.
    pub fn emit(&self, event: SurfaceEvent) {
        let _ = self.events.send(event);
    }

    /// Marks the surface mounted and emits [`SurfaceEvent::Ready`].
    pub fn mark_ready(&self) {
        self.lock().ready = true;
        self.emit(SurfaceEvent::Ready);
    }

    /// Emits a lifecycle [`SurfaceEvent::Error`].
    pub fn fail(&self, message: impl Into<String>) {
        self.emit(SurfaceEvent::Error {
            message: message.into(),
        });
    }

    /// When disabled, animated zooms wait for
    /// [`RecordingSurface::complete_zoom`] before `ZoomEnd` is emitted.
    pub fn set_auto_complete_animations(&self, enabled: bool) {
        self.auto_complete_animations
            .store(enabled, Ordering::Release);
    }

    /// Finishes a pending animated zoom.
    pub fn complete_zoom(&self) {
        self.emit(SurfaceEvent::ZoomEnd);
    }

    /// Makes every following command fail with `message`.
    pub fn reject_commands(&self, message: impl Into<String>) {
        self.lock().rejection = Some(message.into());
    }

    /// Moves the center as if the user dragged the map.
    pub fn drag_to(&self, center: LatLng) {
        self.lock().center = center;
        self.emit(SurfaceEvent::Pointer);
        self.emit(SurfaceEvent::Moved { center });
        self.emit(SurfaceEvent::MoveEnd);
    }

    /// Sets the zoom level without recording a command.
    pub fn set_zoom_silently(&self, zoom: f64) {
        self.lock().zoom = zoom;
    }

    /// Every command received so far, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<SurfaceCommand> {
        self.lock().commands.clone()
    }

    /// Only the camera commands received so far.
    #[must_use]
    pub fn camera_commands(&self) -> Vec<SurfaceCommand> {
        self.lock()
            .commands
            .iter()
            .filter(|command| command.is_camera())
            .cloned()
            .collect()
    }

    /// Number of live event subscriptions.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Checks readiness and rejection, then records `command` and applies
    /// the camera change.
    fn record(
        &self,
        command: SurfaceCommand,
        apply: impl FnOnce(&mut State),
    ) -> Result<(), SurfaceError> {
        let mut state = self.lock();
        if !state.ready {
            return Err(SurfaceError::NotReady);
        }
        if let Some(message) = &state.rejection {
            return Err(SurfaceError::Backend {
                message: message.clone(),
            });
        }
        apply(&mut *state);
        state.commands.push(command);
        Ok(())
    }

    fn moved(&self) {
        let center = self.lock().center;
        self.emit(SurfaceEvent::Moved { center });
        self.emit(SurfaceEvent::MoveEnd);
    }
}

impl MapSurface for RecordingSurface {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn is_ready(&self) -> bool {
        self.lock().ready
    }

    fn zoom(&self) -> f64 {
        self.lock().zoom
    }

    fn center(&self) -> LatLng {
        self.lock().center
    }

    fn set_view(&self, center: LatLng, zoom: f64) -> Result<(), SurfaceError> {
        self.record(SurfaceCommand::SetView { center, zoom }, |state| {
            state.center = center;
            state.zoom = zoom;
        })?;
        self.moved();
        Ok(())
    }

    fn fit_bounds(&self, bounds: &BoundingBox, padding_px: u32) -> Result<(), SurfaceError> {
        self.record(
            SurfaceCommand::FitBounds {
                bounds: *bounds,
                padding_px,
            },
            |state| state.center = bounds.center(),
        )?;
        self.moved();
        Ok(())
    }

    fn animate_zoom(&self, zoom: f64, around: LatLng) -> Result<(), SurfaceError> {
        self.record(SurfaceCommand::AnimateZoom { zoom, around }, |state| {
            state.zoom = zoom;
            state.center = around;
        })?;
        if self.auto_complete_animations.load(Ordering::Acquire) {
            self.complete_zoom();
        }
        Ok(())
    }

    fn pan_inside(&self, target: LatLng, padding: PanPadding) -> Result<(), SurfaceError> {
        self.record(SurfaceCommand::PanInside { target, padding }, |state| {
            state.center = target;
        })?;
        self.moved();
        Ok(())
    }

    fn render_shape(
        &self,
        geometry: &GeometryResult,
        position: LatLng,
    ) -> Result<(), SurfaceError> {
        self.record(
            SurfaceCommand::RenderShape {
                geometry: geometry.clone(),
                position,
            },
            |_| {},
        )?;
        self.emit(SurfaceEvent::Activity);
        Ok(())
    }

    fn render_markers(&self, markers: &[MarkerGlyph]) -> Result<(), SurfaceError> {
        self.record(
            SurfaceCommand::RenderMarkers {
                markers: markers.to_vec(),
            },
            |_| {},
        )?;
        self.emit(SurfaceEvent::Activity);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_before_ready_are_refused() {
        let surface = RecordingSurface::new(Generation::default());
        assert_eq!(
            surface.set_view(LatLng::new(50.0, 14.0), 10.0),
            Err(SurfaceError::NotReady)
        );
        assert!(surface.commands().is_empty());
    }

    #[test]
    fn camera_commands_update_view_and_emit_events() {
        let surface = RecordingSurface::ready(Generation::new(3));
        let mut events = surface.subscribe();

        surface.set_view(LatLng::new(50.0, 14.0), 12.0).unwrap();
        assert_eq!(surface.zoom(), 12.0);
        assert_eq!(surface.center(), LatLng::new(50.0, 14.0));
        assert_eq!(
            events.try_recv().unwrap(),
            SurfaceEvent::Moved {
                center: LatLng::new(50.0, 14.0)
            }
        );
        assert_eq!(events.try_recv().unwrap(), SurfaceEvent::MoveEnd);
    }

    #[test]
    fn manual_animation_mode_withholds_zoom_end() {
        let surface = RecordingSurface::ready(Generation::default());
        surface.set_auto_complete_animations(false);
        let mut events = surface.subscribe();

        surface.animate_zoom(14.0, LatLng::new(50.0, 14.0)).unwrap();
        assert!(events.try_recv().is_err());

        surface.complete_zoom();
        assert_eq!(events.try_recv().unwrap(), SurfaceEvent::ZoomEnd);
    }

    #[test]
    fn rejected_commands_surface_backend_errors() {
        let surface = RecordingSurface::ready(Generation::default());
        surface.reject_commands("tile layer crashed");
        assert!(matches!(
            surface.render_markers(&[]),
            Err(SurfaceError::Backend { .. })
        ));
    }

    #[test]
    fn camera_filter_skips_render_commands() {
        let surface = RecordingSurface::ready(Generation::default());
        surface
            .render_shape(&GeometryResult::Point, LatLng::new(1.0, 2.0))
            .unwrap();
        surface.pan_inside(LatLng::new(1.0, 2.0), PanPadding::default()).unwrap();
        assert_eq!(surface.commands().len(), 2);
        assert_eq!(surface.camera_commands().len(), 1);
    }
}
