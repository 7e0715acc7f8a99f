//! Per-toponym presentation: resolve, classify, fit, render.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use toponym_map_geometry::{GeodataService, GeometryResolver, ResolutionSlot};
use toponym_map_geometry_models::{GeometryResult, Viewport};
use toponym_map_surface::{
    ActivityReporter, SuccessKind, SurfaceError, SurfaceHandle, null_reporter,
};
use toponym_map_toponym_models::Toponym;
use toponym_map_viewport::{ViewportFitter, viewport_for};

/// What the map shows for one toponym.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Presentation {
    /// Render-ready geometry; never [`GeometryResult::None`].
    pub geometry: GeometryResult,
    /// Camera framing for the geometry.
    pub viewport: Viewport,
}

/// Drives toponyms through resolution, fitting and rendering.
///
/// Each toponym gets its own [`ResolutionSlot`], so re-presenting a
/// toponym aborts its previous fetch while other toponyms resolve
/// independently.
pub struct ToponymPresenter<S> {
    resolver: Arc<GeometryResolver<S>>,
    fitter: ViewportFitter,
    reporter: Arc<dyn ActivityReporter>,
    slots: Mutex<BTreeMap<i64, Arc<ResolutionSlot<S>>>>,
}

impl<S: GeodataService> ToponymPresenter<S> {
    /// Creates a presenter that reports nowhere.
    #[must_use]
    pub fn new(resolver: Arc<GeometryResolver<S>>, fitter: ViewportFitter) -> Self {
        Self {
            resolver,
            fitter,
            reporter: null_reporter(),
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    /// Reports successful fits to `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ActivityReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// The viewport fitter.
    #[must_use]
    pub const fn fitter(&self) -> &ViewportFitter {
        &self.fitter
    }

    fn slot(&self, toponym_id: i64) -> SlotLease<'_, S> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = Arc::clone(
            slots
                .entry(toponym_id)
                .or_insert_with(|| Arc::new(ResolutionSlot::new(Arc::clone(&self.resolver)))),
        );
        SlotLease {
            slots: &self.slots,
            toponym_id,
            slot,
        }
    }

    /// Number of toponyms with a resolution in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Resolves `toponym` without touching a surface.
    ///
    /// Returns `None` if a newer resolution of the same toponym superseded
    /// this one.
    pub async fn resolve(&self, toponym: &Toponym) -> Option<Presentation> {
        let lease = self.slot(toponym.id);
        let resolution = lease
            .slot
            .resolve(toponym.boundary_id, toponym.resolution_kind())
            .await;
        drop(lease);
        let geometry = resolution.into_geometry()?;

        let viewport = viewport_for(&geometry, toponym.position, self.fitter.options());
        Some(Presentation {
            geometry: geometry.render_ready(),
            viewport,
        })
    }

    /// Resolves `toponym`, fits the camera and renders the shape.
    ///
    /// Returns `Ok(None)` without touching the surface if the resolution
    /// was superseded.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] if the surface never becomes ready or
    /// rejects a command. Geometry failures are not errors: they render a
    /// point marker at the toponym's position.
    pub async fn present(
        &self,
        handle: &SurfaceHandle,
        toponym: &Toponym,
    ) -> Result<Option<Presentation>, SurfaceError> {
        let Some(presentation) = self.resolve(toponym).await else {
            return Ok(None);
        };

        self.fitter.apply(handle, presentation.viewport).await?;
        handle
            .surface()
            .render_shape(&presentation.geometry, toponym.position)?;
        self.reporter
            .record_success(handle.generation(), SuccessKind::ViewportFit);

        log::debug!(
            "Presented toponym {} as {}",
            toponym.id,
            presentation.geometry.kind_label()
        );
        Ok(Some(presentation))
    }

    /// Aborts any resolution in flight for `toponym_id` and forgets its
    /// slot. Settled resolutions release their slot on their own.
    pub fn forget(&self, toponym_id: i64) {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&toponym_id);
        if let Some(slot) = slot {
            slot.cancel();
        }
    }
}

/// A presenter slot held for the duration of one resolution.
///
/// The last lease to settle removes the slot from the map, so only
/// toponyms with a resolution in flight keep an entry.
struct SlotLease<'a, S> {
    slots: &'a Mutex<BTreeMap<i64, Arc<ResolutionSlot<S>>>>,
    toponym_id: i64,
    slot: Arc<ResolutionSlot<S>>,
}

impl<S> Drop for SlotLease<'_, S> {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = slots.get(&self.toponym_id) else {
            return;
        };
        // The map and this lease are the only owners left.
        if Arc::ptr_eq(entry, &self.slot) && Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.toponym_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use toponym_map_geometry::overpass::parse_response;
    use toponym_map_geometry::{GeometryError, OverpassResponse};
    use toponym_map_geometry_models::{BoundingBox, FeatureKind, LatLng};
    use toponym_map_surface::{Generation, RecordingSurface, SurfaceCommand};
    use toponym_map_toponym_models::LocalizedText;
    use toponym_map_viewport::FitOptions;

    use super::*;

    /// Serves a fixed body after `delay_ms`, or fails when there is none.
    struct StaticService {
        body: Option<&'static str>,
        delay_ms: u64,
    }

    #[async_trait]
    impl GeodataService for StaticService {
        fn id(&self) -> &str {
            "static"
        }

        async fn query(&self, _query: &str) -> Result<OverpassResponse, GeometryError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            match self.body {
                Some(body) => parse_response(body),
                None => Err(GeometryError::Status { status: 429 }),
            }
        }
    }

    const RELATION: &str = r#"{"elements": [{
        "type": "relation", "id": 1,
        "members": [
            {"type": "way", "role": "outer", "geometry": [
                {"lat": 49.0, "lon": 16.0}, {"lat": 49.2, "lon": 16.5}, {"lat": 49.0, "lon": 16.0}
            ]},
            {"type": "way", "role": "inner", "geometry": [{"lat": 60.0, "lon": 20.0}]}
        ]
    }]}"#;

    fn toponym(boundary_id: Option<i64>, kind: FeatureKind) -> Toponym {
        Toponym {
            id: 1,
            name: LocalizedText::from_pairs([("cs", "Brno")]),
            description: LocalizedText::default(),
            position: LatLng::new(49.1951, 16.6068),
            boundary_id,
            feature_kind: Some(kind),
            duplicate_count: None,
        }
    }

    fn presenter(body: Option<&'static str>) -> ToponymPresenter<StaticService> {
        delayed_presenter(body, 0)
    }

    fn delayed_presenter(
        body: Option<&'static str>,
        delay_ms: u64,
    ) -> ToponymPresenter<StaticService> {
        ToponymPresenter::new(
            Arc::new(GeometryResolver::new(StaticService { body, delay_ms })),
            ViewportFitter::new(FitOptions {
                settle_delay_ms: 0,
                ..FitOptions::default()
            }),
        )
    }

    struct CountingReporter(Mutex<Vec<(Generation, SuccessKind)>>);

    impl ActivityReporter for CountingReporter {
        fn record_success(&self, generation: Generation, kind: SuccessKind) {
            self.0.lock().unwrap().push((generation, kind));
        }
    }

    #[tokio::test]
    async fn administrative_boundary_is_fitted_and_rendered() {
        let reporter = Arc::new(CountingReporter(Mutex::new(Vec::new())));
        let presenter = presenter(Some(RELATION)).with_reporter(reporter.clone());
        let surface = RecordingSurface::ready(Generation::new(2));
        let handle = SurfaceHandle::new(surface.clone());

        let presentation = presenter
            .present(&handle, &toponym(Some(1), FeatureKind::Administrative))
            .await
            .unwrap()
            .unwrap();

        assert!(
            matches!(presentation.geometry, GeometryResult::MultiArea { ref rings } if rings.len() == 1)
        );
        let bounds = BoundingBox::new(49.0, 49.2, 16.0, 16.5);
        assert_eq!(
            presentation.viewport,
            Viewport::BoundsView {
                bounds,
                padding_px: 20
            }
        );

        let commands = surface.commands();
        assert_eq!(
            commands[0],
            SurfaceCommand::FitBounds {
                bounds,
                padding_px: 20
            }
        );
        assert!(matches!(commands[1], SurfaceCommand::RenderShape { .. }));
        assert_eq!(
            *reporter.0.lock().unwrap(),
            vec![(Generation::new(2), SuccessKind::ViewportFit)]
        );
    }

    #[tokio::test]
    async fn failed_lookup_falls_back_to_a_point_marker() {
        let presenter = presenter(None);
        let surface = RecordingSurface::ready(Generation::default());
        let handle = SurfaceHandle::new(surface.clone());
        let toponym = toponym(Some(1), FeatureKind::Simple);

        let presentation = presenter.present(&handle, &toponym).await.unwrap().unwrap();
        assert_eq!(presentation.geometry, GeometryResult::Point);
        assert_eq!(
            presentation.viewport,
            Viewport::PointView {
                center: toponym.position,
                zoom: 13.0
            }
        );
        assert_eq!(
            surface.commands()[1],
            SurfaceCommand::RenderShape {
                geometry: GeometryResult::Point,
                position: toponym.position,
            }
        );
    }

    #[tokio::test]
    async fn missing_boundary_id_renders_a_point_without_lookup() {
        let presenter = presenter(Some(RELATION));
        let presentation = presenter
            .resolve(&toponym(None, FeatureKind::Administrative))
            .await
            .unwrap();
        assert_eq!(presentation.geometry, GeometryResult::Point);
    }

    #[tokio::test(start_paused = true)]
    async fn unready_surface_is_an_error() {
        let presenter = presenter(Some(RELATION));
        let surface = RecordingSurface::new(Generation::default());
        let handle = SurfaceHandle::new(surface.clone());

        let result = presenter
            .present(&handle, &toponym(Some(1), FeatureKind::Administrative))
            .await;
        assert!(matches!(result, Err(SurfaceError::ReadyTimeout { .. })));
        assert!(surface.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn settled_resolutions_release_their_slot() {
        let presenter = Arc::new(delayed_presenter(Some(RELATION), 100));
        let boundary = toponym(Some(1), FeatureKind::Administrative);

        let first = tokio::spawn({
            let presenter = Arc::clone(&presenter);
            let boundary = boundary.clone();
            async move { presenter.resolve(&boundary).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(presenter.pending_count(), 1);

        assert!(presenter.resolve(&boundary).await.is_some());
        assert!(first.await.unwrap().is_none());
        assert_eq!(presenter.pending_count(), 0);

        assert!(presenter.resolve(&toponym(None, FeatureKind::Simple)).await.is_some());
        assert_eq!(presenter.pending_count(), 0);
    }
}
