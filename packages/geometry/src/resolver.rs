//! Geometry resolution and per-toponym request ownership.
//!
//! [`GeometryResolver`] never fails: every transport or payload error is
//! logged and collapses into [`GeometryResult::None`]. [`ResolutionSlot`]
//! guarantees that a toponym has at most one fetch in flight; starting a
//! new resolution aborts the previous one, which then reports
//! [`Resolution::Superseded`] instead of a result.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use toponym_map_geometry_models::{FeatureKind, GeometryResult};
use toponym_map_surface::{Generation, GenerationCounter};

use crate::{GeodataService, classify, overpass_query};

/// Default per-request timeout for geodata queries.
pub const DEFAULT_TIMEOUT_MS: u64 = 25_000;

/// Resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverOptions {
    /// Explicit interpreter endpoint. Uses the service registry when unset.
    pub endpoint: Option<String>,
    /// Upper bound for a single request, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Resolves boundary identifiers through a [`GeodataService`].
#[derive(Debug)]
pub struct GeometryResolver<S> {
    service: S,
}

impl<S: GeodataService> GeometryResolver<S> {
    /// Creates a resolver backed by `service`.
    pub const fn new(service: S) -> Self {
        Self { service }
    }

    /// The backing service.
    pub const fn service(&self) -> &S {
        &self.service
    }

    /// Resolves `boundary_id` into a classified geometry.
    ///
    /// An absent id returns [`GeometryResult::None`] without touching the
    /// network. Failures are logged and also return `None`; there is no
    /// retry.
    pub async fn resolve(&self, boundary_id: Option<i64>, kind: FeatureKind) -> GeometryResult {
        let Some(id) = boundary_id else {
            return GeometryResult::None;
        };

        let query = overpass_query(id, kind);
        match self.service.query(&query).await {
            Ok(response) => {
                let geometry = classify(&response, kind);
                log::debug!("Resolved {kind} {id} as {}", geometry.kind_label());
                geometry
            }
            Err(e) => {
                log::warn!(
                    "Geometry lookup for {kind} {id} via {} failed: {e}",
                    self.service.id()
                );
                GeometryResult::None
            }
        }
    }
}

/// Outcome of a [`ResolutionSlot::resolve`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The latest resolution finished.
    Resolved(GeometryResult),
    /// A newer resolution (or an explicit cancel) replaced this one.
    Superseded,
}

impl Resolution {
    /// The geometry, if this resolution was not superseded.
    #[must_use]
    pub fn into_geometry(self) -> Option<GeometryResult> {
        match self {
            Self::Resolved(geometry) => Some(geometry),
            Self::Superseded => None,
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    inflight: Option<CancellationToken>,
    latest: Option<GeometryResult>,
}

/// Owns the single in-flight resolution of one toponym.
#[derive(Debug)]
pub struct ResolutionSlot<S> {
    resolver: Arc<GeometryResolver<S>>,
    generations: GenerationCounter,
    state: Mutex<SlotState>,
}

impl<S: GeodataService> ResolutionSlot<S> {
    /// Creates an empty slot sharing `resolver`.
    #[must_use]
    pub fn new(resolver: Arc<GeometryResolver<S>>) -> Self {
        Self {
            resolver,
            generations: GenerationCounter::new(),
            state: Mutex::new(SlotState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a resolution, aborting the one currently in flight.
    ///
    /// Only the most recently started resolution can store a result.
    pub async fn resolve(&self, boundary_id: Option<i64>, kind: FeatureKind) -> Resolution {
        let token = CancellationToken::new();
        let generation = {
            let mut state = self.lock();
            if let Some(previous) = state.inflight.replace(token.clone()) {
                previous.cancel();
            }
            self.generations.advance()
        };

        let geometry = tokio::select! {
            biased;
            () = token.cancelled() => None,
            geometry = self.resolver.resolve(boundary_id, kind) => Some(geometry),
        };

        self.settle(generation, geometry)
    }

    fn settle(&self, generation: Generation, geometry: Option<GeometryResult>) -> Resolution {
        let mut state = self.lock();
        match geometry {
            Some(geometry) if self.generations.is_current(generation) => {
                state.inflight = None;
                state.latest = Some(geometry.clone());
                Resolution::Resolved(geometry)
            }
            _ => {
                log::debug!("Resolution {generation} superseded");
                Resolution::Superseded
            }
        }
    }

    /// Aborts the in-flight resolution, if any.
    pub fn cancel(&self) {
        let mut state = self.lock();
        if let Some(token) = state.inflight.take() {
            token.cancel();
            self.generations.advance();
        }
    }

    /// The last stored result.
    #[must_use]
    pub fn latest(&self) -> Option<GeometryResult> {
        self.lock().latest.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::{GeometryError, OverpassResponse, overpass::parse_response};

    /// Answers way queries with a three-point open way after a delay
    /// derived from the queried id (in milliseconds).
    #[derive(Default)]
    struct DelayedService {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl GeodataService for DelayedService {
        fn id(&self) -> &str {
            "fake"
        }

        async fn query(&self, query: &str) -> Result<OverpassResponse, GeometryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GeometryError::Status { status: 504 });
            }
            let id: u64 = query
                .split(['(', ')'])
                .nth(1)
                .and_then(|id| id.parse().ok())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(id)).await;
            let lat = f64::from(u32::try_from(id).unwrap());
            parse_response(&format!(
                r#"{{"elements": [{{"type": "way", "id": {id}, "geometry": [
                    {{"lat": {lat}, "lon": 0.0}}, {{"lat": {lat}, "lon": 1.0}}, {{"lat": {lat}, "lon": 2.0}}
                ]}}]}}"#
            ))
        }
    }

    async fn wait_for_calls(slot: &ResolutionSlot<DelayedService>, calls: usize) {
        while slot.resolver.service().calls.load(Ordering::SeqCst) < calls {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn absent_identifier_skips_the_network() {
        let resolver = GeometryResolver::new(DelayedService::default());
        assert_eq!(
            resolver.resolve(None, FeatureKind::Simple).await,
            GeometryResult::None
        );
        assert_eq!(resolver.service().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn service_errors_collapse_into_none() {
        let resolver = GeometryResolver::new(DelayedService {
            fail: true,
            ..DelayedService::default()
        });
        assert_eq!(
            resolver.resolve(Some(7), FeatureKind::Simple).await,
            GeometryResult::None
        );
        assert_eq!(resolver.service().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_way_into_path() {
        let resolver = GeometryResolver::new(DelayedService::default());
        let geometry = resolver.resolve(Some(5), FeatureKind::Simple).await;
        assert!(matches!(geometry, GeometryResult::Path { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn re_resolution_supersedes_the_prior_fetch() {
        let slot = Arc::new(ResolutionSlot::new(Arc::new(GeometryResolver::new(
            DelayedService::default(),
        ))));

        let slow = tokio::spawn({
            let slot = Arc::clone(&slot);
            async move { slot.resolve(Some(500), FeatureKind::Simple).await }
        });
        wait_for_calls(&slot, 1).await;

        let fast = slot.resolve(Some(20), FeatureKind::Simple).await;
        assert_eq!(slow.await.unwrap(), Resolution::Superseded);

        let Resolution::Resolved(GeometryResult::Path { rings }) = fast else {
            panic!("expected the newer resolution to win");
        };
        assert_eq!(rings[0].0[0].lat, 20.0);
        assert_eq!(slot.latest(), Some(GeometryResult::Path { rings }));
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_resolutions_both_complete() {
        let slot = ResolutionSlot::new(Arc::new(GeometryResolver::new(
            DelayedService::default(),
        )));
        assert!(matches!(
            slot.resolve(Some(10), FeatureKind::Simple).await,
            Resolution::Resolved(_)
        ));
        assert!(matches!(
            slot.resolve(Some(30), FeatureKind::Simple).await,
            Resolution::Resolved(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_without_storing() {
        let slot = Arc::new(ResolutionSlot::new(Arc::new(GeometryResolver::new(
            DelayedService::default(),
        ))));
        let pending = tokio::spawn({
            let slot = Arc::clone(&slot);
            async move { slot.resolve(Some(100), FeatureKind::Simple).await }
        });
        wait_for_calls(&slot, 1).await;

        slot.cancel();
        assert_eq!(pending.await.unwrap(), Resolution::Superseded);
        assert_eq!(slot.latest(), None);
    }
}
