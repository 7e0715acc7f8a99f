#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate radius search.
//!
//! The flow has two halves. On the map, a [`CenterPicker`] follows the
//! viewport center and shows it in DMS notation; confirming yields a
//! [`CoordinateQuery`] that is handed over as a navigable URL. On the
//! results side, a [`SearchSession`] merges the query with its
//! [`SearchFilters`], fetches one page from the [`ContentApi`] and ranks
//! it by the free-text term.

pub mod client;
pub mod dms;
pub mod filters;
pub mod picker;
pub mod query;
pub mod ranking;
pub mod session;

use thiserror::Error;

pub use client::{ContentApi, ContentApiOptions, HttpContentApi, Page};
pub use dms::{DmsPair, to_dms};
pub use filters::{RegionRecord, RegionTree, SearchFilters, SortOrder};
pub use picker::CenterPicker;
pub use query::{CoordinateQuery, DEFAULT_RADIUS_METERS};
pub use ranking::rank_by_term;
pub use session::{DEFAULT_RESULTS_URL, SearchOptions, SearchOutcome, SearchResults, SearchSession};

/// Errors from the content API and query handling.
#[derive(Debug, Error)]
pub enum SearchError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Payload was not the expected JSON shape.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The content API answered with a non-2xx status.
    #[error("Content API returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// A configured URL could not be parsed.
    #[error("Invalid URL: {message}")]
    InvalidUrl {
        /// Description of the problem.
        message: String,
    },

    /// A results URL did not describe a valid coordinate query.
    #[error("Invalid coordinate query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },
}
