#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry resolution for toponyms.
//!
//! Turns a toponym's external boundary identifier into a classified
//! [`GeometryResult`](toponym_map_geometry_models::GeometryResult):
//!
//! 1. [`overpass`] builds the relation/way query and decodes the
//!    service payload into typed DTOs.
//! 2. [`classify`] interprets the first element as a multi-area, area,
//!    path or nothing. It is pure and never touches the network.
//! 3. [`resolver`] performs the single network call, converts every
//!    failure into `None`, and keeps at most one in-flight fetch per
//!    toponym.
//!
//! Geodata endpoints are loaded from the [`service_registry`].

pub mod classify;
pub mod overpass;
pub mod resolver;
pub mod service_registry;

use async_trait::async_trait;
use thiserror::Error;

pub use classify::classify;
pub use overpass::{OverpassClient, OverpassResponse, overpass_query};
pub use resolver::{GeometryResolver, Resolution, ResolutionSlot, ResolverOptions};

/// Errors from geodata queries.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Payload was not the expected JSON shape.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service answered with a non-2xx status.
    #[error("Geodata service returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// No usable geodata endpoint is configured.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what is missing.
        message: String,
    },
}

/// A geodata query service.
///
/// Implementations perform exactly one request per call and never retry.
#[async_trait]
pub trait GeodataService: Send + Sync {
    /// Identifier of the backing service (for logs).
    fn id(&self) -> &str;

    /// Runs `query` and decodes the response.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] on transport failure, non-2xx status or
    /// an unparsable payload.
    async fn query(&self, query: &str) -> Result<OverpassResponse, GeometryError>;
}

#[async_trait]
impl<T: GeodataService + ?Sized> GeodataService for std::sync::Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    async fn query(&self, query: &str) -> Result<OverpassResponse, GeometryError> {
        (**self).query(query).await
    }
}
