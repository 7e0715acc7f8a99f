//! Content API client for radius searches.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use toponym_map_toponym_models::{ApiToponym, Toponym};

use crate::{CoordinateQuery, SearchError};

/// Base URL used when none is configured.
pub const DEFAULT_CONTENT_API_URL: &str = "http://localhost:8000/api/";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Path of the radius search endpoint below the API base.
const RADIUS_PATH: &str = "toponyms/radius/";

/// Content API connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentApiOptions {
    /// API base URL.
    pub base_url: String,
    /// Upper bound for a single request, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ContentApiOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CONTENT_API_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub results: Vec<T>,
    /// Total number of matches across all pages.
    #[serde(default)]
    pub count: u64,
    /// URL of the next page.
    #[serde(default)]
    pub next: Option<String>,
    /// URL of the previous page.
    #[serde(default)]
    pub previous: Option<String>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            count: 0,
            next: None,
            previous: None,
        }
    }
}

impl<T> Page<T> {
    /// An empty page.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

impl Page<ApiToponym> {
    /// Validates every record, dropping the ones with unusable
    /// coordinates.
    #[must_use]
    pub fn into_toponyms(self) -> Page<Toponym> {
        let results = self
            .results
            .into_iter()
            .filter_map(|raw| {
                let id = raw.id;
                Toponym::try_from(raw)
                    .map_err(|e| log::warn!("Dropping toponym {id}: {e}"))
                    .ok()
            })
            .collect();

        Page {
            results,
            count: self.count,
            next: self.next,
            previous: self.previous,
        }
    }
}

/// The toponym content API.
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Fetches one page of toponyms within the query radius.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] on transport failure, non-2xx status or an
    /// unparsable payload.
    async fn toponyms_within_radius(
        &self,
        query: &CoordinateQuery,
    ) -> Result<Page<ApiToponym>, SearchError>;
}

/// [`ContentApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpContentApi {
    client: reqwest::Client,
    radius_url: Url,
    timeout: Duration,
}

impl HttpContentApi {
    /// Creates a client for the API at `options.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidUrl`] if the base URL is not an
    /// absolute URL.
    pub fn new(client: reqwest::Client, options: &ContentApiOptions) -> Result<Self, SearchError> {
        let mut base = options.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let radius_url = Url::parse(&base)
            .and_then(|base| base.join(RADIUS_PATH))
            .map_err(|e| SearchError::InvalidUrl {
                message: format!("{}: {e}", options.base_url),
            })?;

        Ok(Self {
            client,
            radius_url,
            timeout: Duration::from_millis(options.timeout_ms),
        })
    }

    /// The radius search endpoint.
    #[must_use]
    pub const fn radius_url(&self) -> &Url {
        &self.radius_url
    }
}

#[async_trait]
impl ContentApi for HttpContentApi {
    async fn toponyms_within_radius(
        &self,
        query: &CoordinateQuery,
    ) -> Result<Page<ApiToponym>, SearchError> {
        let resp = self
            .client
            .get(self.radius_url.clone())
            .query(&query.to_query_pairs())
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await?;
        parse_page(&body)
    }
}

/// Parses a radius search response body.
///
/// # Errors
///
/// Returns [`SearchError::Json`] if the body is not a toponym page.
pub fn parse_page(body: &str) -> Result<Page<ApiToponym>, SearchError> {
    Ok(serde_json::from_str(body)?)
}
