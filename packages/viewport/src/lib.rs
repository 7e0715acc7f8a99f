#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Viewport fitting.
//!
//! Shapes are framed by the bounding box of all their rings; points and
//! missing geometry fall back to a fixed zoom around the toponym's own
//! coordinates. Nothing is sent to the surface before it has signalled
//! readiness and a short settling delay has passed.

use std::time::Duration;

use geo::BoundingRect;
use serde::{Deserialize, Serialize};
use toponym_map_geometry_models::{BoundingBox, CoordinateSequence, GeometryResult, LatLng, Viewport};
use toponym_map_surface::{SurfaceError, SurfaceHandle, wait_until_ready};

/// Padding around fitted bounds, in pixels.
pub const DEFAULT_PADDING_PX: u32 = 20;
/// Zoom used for point views.
pub const DEFAULT_POINT_ZOOM: f64 = 13.0;
/// Delay between readiness and the first camera command.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 150;
/// Upper bound on waiting for the surface-ready event.
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 10_000;

/// Viewport fitting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Padding for bounds views, shared by every call site.
    pub padding_px: u32,
    /// Zoom for point views.
    pub point_zoom: f64,
    /// Settling delay after readiness, in milliseconds.
    pub settle_delay_ms: u64,
    /// Readiness gate timeout, in milliseconds.
    pub ready_timeout_ms: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            padding_px: DEFAULT_PADDING_PX,
            point_zoom: DEFAULT_POINT_ZOOM,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
        }
    }
}

/// Bounding box of the flattened union of `rings`.
///
/// Returns `None` when the rings hold no coordinates at all.
#[must_use]
pub fn bounds_of(rings: &[CoordinateSequence]) -> Option<BoundingBox> {
    let points: geo::MultiPoint<f64> = rings
        .iter()
        .flat_map(CoordinateSequence::iter)
        .map(|coord| geo::Point::new(coord.lon, coord.lat))
        .collect();

    points
        .bounding_rect()
        .map(|rect| BoundingBox::new(rect.min().y, rect.max().y, rect.min().x, rect.max().x))
}

/// Chooses the viewport for `geometry`, falling back to a point view at
/// `position`.
#[must_use]
pub fn viewport_for(geometry: &GeometryResult, position: LatLng, options: &FitOptions) -> Viewport {
    let point_view = Viewport::PointView {
        center: position,
        zoom: options.point_zoom,
    };

    if !geometry.is_shape() {
        return point_view;
    }

    bounds_of(geometry.rings()).map_or(point_view, |bounds| Viewport::BoundsView {
        bounds,
        padding_px: options.padding_px,
    })
}

/// Applies viewports to a mounted surface.
#[derive(Debug, Clone, Default)]
pub struct ViewportFitter {
    options: FitOptions,
}

impl ViewportFitter {
    /// Creates a fitter with `options`.
    #[must_use]
    pub const fn new(options: FitOptions) -> Self {
        Self { options }
    }

    /// The fitter's configuration.
    #[must_use]
    pub const fn options(&self) -> &FitOptions {
        &self.options
    }

    /// Computes the viewport for `geometry` and applies it.
    ///
    /// # Errors
    ///
    /// See [`ViewportFitter::apply`].
    pub async fn fit(
        &self,
        handle: &SurfaceHandle,
        geometry: &GeometryResult,
        position: LatLng,
    ) -> Result<Viewport, SurfaceError> {
        let viewport = viewport_for(geometry, position, &self.options);
        self.apply(handle, viewport).await
    }

    /// Waits for the surface to be ready, lets it settle, then issues the
    /// camera command for `viewport` under the camera lease.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] if the surface never becomes ready, is
    /// torn down meanwhile, or rejects the command.
    pub async fn apply(
        &self,
        handle: &SurfaceHandle,
        viewport: Viewport,
    ) -> Result<Viewport, SurfaceError> {
        wait_until_ready(
            handle.surface().as_ref(),
            Duration::from_millis(self.options.ready_timeout_ms),
        )
        .await?;
        tokio::time::sleep(Duration::from_millis(self.options.settle_delay_ms)).await;

        let camera = handle.camera().await?;
        match viewport {
            Viewport::PointView { center, zoom } => camera.set_view(center, zoom)?,
            Viewport::BoundsView { bounds, padding_px } => camera.fit_bounds(&bounds, padding_px)?,
        }
        log::debug!(
            "Applied {viewport:?} to surface generation {}",
            handle.generation()
        );

        Ok(viewport)
    }
}
