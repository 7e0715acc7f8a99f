//! The results side of a radius search.
//!
//! A [`SearchSession`] owns the displayed result page. Issuing a query
//! aborts the one in flight, and only the most recently issued query may
//! replace the displayed page. Failures never escape: they show an empty
//! page with a notice.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use toponym_map_surface::{Generation, GenerationCounter};
use toponym_map_toponym_models::Toponym;

use crate::{ContentApi, CoordinateQuery, DEFAULT_RADIUS_METERS, Page, rank_by_term};

/// Results view that confirmed points navigate to by default.
pub const DEFAULT_RESULTS_URL: &str = "http://localhost:8000/toponyms/";

/// Notice shown when a search could not be completed.
pub const SEARCH_FAILED_NOTICE: &str = "Search results are unavailable right now.";

/// Search configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Radius applied when a picked point is confirmed.
    pub radius_meters: u32,
    /// Base URL of the results view that picked points navigate to.
    pub results_url: String,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            radius_meters: DEFAULT_RADIUS_METERS,
            results_url: DEFAULT_RESULTS_URL.to_string(),
        }
    }
}

/// The page currently shown for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    /// The query the page answers.
    pub query: CoordinateQuery,
    /// Validated, ranked toponyms.
    pub page: Page<Toponym>,
    /// Non-fatal notice to show above the results.
    pub notice: Option<String>,
}

/// Outcome of [`SearchSession::search`].
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// The query's page is now displayed.
    Applied,
    /// The request failed; an empty page with a notice is displayed.
    Failed {
        /// The notice shown.
        notice: String,
    },
    /// A newer query replaced this one before it finished.
    Superseded,
}

#[derive(Debug, Default)]
struct SessionState {
    inflight: Option<CancellationToken>,
    displayed: Option<SearchResults>,
}

/// Last-issued-query-wins search against a [`ContentApi`].
pub struct SearchSession<A> {
    api: Arc<A>,
    language: String,
    generations: GenerationCounter,
    state: Mutex<SessionState>,
}

impl<A: ContentApi> SearchSession<A> {
    /// Creates a session that ranks names in `language`.
    #[must_use]
    pub fn new(api: Arc<A>, language: impl Into<String>) -> Self {
        Self {
            api,
            language: language.into(),
            generations: GenerationCounter::new(),
            state: Mutex::new(SessionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `query`, aborting any query still in flight.
    pub async fn search(&self, query: CoordinateQuery) -> SearchOutcome {
        let token = CancellationToken::new();
        let generation = {
            let mut state = self.lock();
            if let Some(previous) = state.inflight.replace(token.clone()) {
                previous.cancel();
            }
            self.generations.advance()
        };

        let response = tokio::select! {
            biased;
            () = token.cancelled() => None,
            response = self.api.toponyms_within_radius(&query) => Some(response),
        };

        let Some(response) = response else {
            log::debug!("Search {generation} aborted");
            return SearchOutcome::Superseded;
        };

        let (results, outcome) = match response {
            Ok(page) => {
                let page = page.into_toponyms();
                let ranked = rank_by_term(page.results, query.extra_filters.term(), &self.language);
                let page = Page {
                    results: ranked,
                    ..page
                };
                let results = SearchResults {
                    query,
                    page,
                    notice: None,
                };
                (results, SearchOutcome::Applied)
            }
            Err(e) => {
                log::warn!("Radius search failed: {e}");
                let results = SearchResults {
                    query,
                    page: Page::empty(),
                    notice: Some(SEARCH_FAILED_NOTICE.to_string()),
                };
                let outcome = SearchOutcome::Failed {
                    notice: SEARCH_FAILED_NOTICE.to_string(),
                };
                (results, outcome)
            }
        };

        self.settle(generation, results, outcome)
    }

    fn settle(
        &self,
        generation: Generation,
        results: SearchResults,
        outcome: SearchOutcome,
    ) -> SearchOutcome {
        let mut state = self.lock();
        if !self.generations.is_current(generation) {
            log::debug!("Search {generation} superseded");
            return SearchOutcome::Superseded;
        }
        state.inflight = None;
        state.displayed = Some(results);
        outcome
    }

    /// Aborts the query in flight, if any.
    pub fn cancel(&self) {
        let mut state = self.lock();
        if let Some(token) = state.inflight.take() {
            token.cancel();
            self.generations.advance();
        }
    }

    /// The displayed page.
    #[must_use]
    pub fn displayed(&self) -> Option<SearchResults> {
        self.lock().displayed.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use toponym_map_geometry_models::LatLng;
    use toponym_map_toponym_models::{ApiToponym, LocalizedText, RawCoordinate};

    use super::*;
    use crate::{SearchError, SearchFilters};

    /// Answers with three toponyms after a delay of `radius` milliseconds.
    /// A zero radius fails.
    #[derive(Default)]
    struct FakeApi {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentApi for FakeApi {
        async fn toponyms_within_radius(
            &self,
            query: &CoordinateQuery,
        ) -> Result<Page<ApiToponym>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query.radius_meters == 0 {
                return Err(SearchError::Status { status: 502 });
            }
            tokio::time::sleep(Duration::from_millis(u64::from(query.radius_meters))).await;

            let names = ["Lhota", "Horní Lhota", "Hořice"];
            let results = names
                .iter()
                .enumerate()
                .map(|(i, name)| ApiToponym {
                    id: i64::from(query.radius_meters) * 10 + i64::try_from(i).unwrap(),
                    name: LocalizedText::from_pairs([("cs", *name)]),
                    description: LocalizedText::default(),
                    latitude: RawCoordinate::Text(query.latitude.to_string()),
                    longitude: RawCoordinate::Number(query.longitude),
                    boundary_id: None,
                    is_settlement: None,
                    duplicate_count: None,
                })
                .collect();
            Ok(Page {
                results,
                count: 3,
                next: None,
                previous: None,
            })
        }
    }

    fn query(radius_meters: u32) -> CoordinateQuery {
        CoordinateQuery::new(LatLng::new(49.0, 16.0), radius_meters)
    }

    async fn wait_for_calls(api: &FakeApi, calls: usize) {
        while api.calls.load(Ordering::SeqCst) < calls {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn applies_a_page() {
        let session = SearchSession::new(Arc::new(FakeApi::default()), "cs");
        assert_eq!(session.search(query(10)).await, SearchOutcome::Applied);

        let displayed = session.displayed().unwrap();
        assert_eq!(displayed.page.results.len(), 3);
        assert_eq!(displayed.notice, None);
        assert_eq!(displayed.query, query(10));
    }

    #[tokio::test(start_paused = true)]
    async fn term_reorders_the_page() {
        let session = SearchSession::new(Arc::new(FakeApi::default()), "cs");
        let q = query(10).with_filters(SearchFilters {
            term: Some("hor".to_string()),
            ..SearchFilters::default()
        });
        session.search(q).await;

        let displayed = session.displayed().unwrap();
        let names: Vec<&str> = displayed
            .page
            .results
            .iter()
            .map(|t| t.display_name("cs"))
            .collect();
        assert_eq!(names, vec!["Hořice", "Horní Lhota", "Lhota"]);
    }

    #[tokio::test(start_paused = true)]
    async fn later_query_wins_even_if_the_earlier_one_answers_last() {
        let api = Arc::new(FakeApi::default());
        let session = Arc::new(SearchSession::new(Arc::clone(&api), "cs"));

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.search(query(500)).await }
        });
        wait_for_calls(&api, 1).await;

        assert_eq!(session.search(query(20)).await, SearchOutcome::Applied);
        assert_eq!(first.await.unwrap(), SearchOutcome::Superseded);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(session.displayed().unwrap().query, query(20));
    }

    #[tokio::test]
    async fn failure_shows_an_empty_page_with_a_notice() {
        let session = SearchSession::new(Arc::new(FakeApi::default()), "cs");
        assert_eq!(
            session.search(query(0)).await,
            SearchOutcome::Failed {
                notice: SEARCH_FAILED_NOTICE.to_string()
            }
        );

        let displayed = session.displayed().unwrap();
        assert!(displayed.page.results.is_empty());
        assert_eq!(displayed.notice.as_deref(), Some(SEARCH_FAILED_NOTICE));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_keeps_the_previous_page() {
        let api = Arc::new(FakeApi::default());
        let session = Arc::new(SearchSession::new(Arc::clone(&api), "cs"));
        session.search(query(10)).await;

        let pending = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.search(query(300)).await }
        });
        wait_for_calls(&api, 2).await;
        session.cancel();

        assert_eq!(pending.await.unwrap(), SearchOutcome::Superseded);
        assert_eq!(session.displayed().unwrap().query, query(10));
    }
}
