#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Wiring of the toponym map engine.
//!
//! [`EngineConfig`] layers the configuration; [`Engine`] turns it into
//! the live components: a [`ToponymPresenter`] over the configured
//! geodata service, a [`SearchSession`] over the content API, and
//! factories for the per-surface pieces (focus coordinator, cluster
//! layer, center picker, map shell).

pub mod config;
pub mod presenter;

use std::sync::Arc;

use thiserror::Error;
use toponym_map_cluster::{ClusterLayer, FocusCoordinator};
use toponym_map_geometry::{GeometryError, GeometryResolver, OverpassClient};
use toponym_map_health::{MapShell, SurfaceFactory};
use toponym_map_search::{CenterPicker, HttpContentApi, SearchError, SearchSession};
use toponym_map_surface::{ActivityReporter, MapSurface, SurfaceHandle, null_reporter};
use toponym_map_toponym_models::Toponym;
use toponym_map_viewport::ViewportFitter;

pub use config::{CliOverrides, ConfigError, EngineConfig};
pub use presenter::{Presentation, ToponymPresenter};

/// Errors raised while assembling the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The geodata client could not be built.
    #[error("Geodata client error: {0}")]
    Geometry(#[from] GeometryError),

    /// The content API client could not be built.
    #[error("Content API client error: {0}")]
    Search(#[from] SearchError),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Live engine components built from one [`EngineConfig`].
pub struct Engine {
    config: EngineConfig,
    reporter: Arc<dyn ActivityReporter>,
    presenter: ToponymPresenter<OverpassClient>,
    search: Arc<SearchSession<HttpContentApi>>,
}

impl Engine {
    /// Builds the HTTP clients and services described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if a client cannot be built or a
    /// configured URL is invalid.
    pub fn from_config(config: EngineConfig) -> Result<Self, EngineError> {
        let geodata = OverpassClient::from_options(&config.resolver)?;
        log::info!("Resolving geometry via {}", geodata.endpoint());

        let presenter = ToponymPresenter::new(
            Arc::new(GeometryResolver::new(geodata)),
            ViewportFitter::new(config.viewport.clone()),
        );

        let http = reqwest::Client::builder()
            .user_agent(concat!("toponym-map/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let content_api = HttpContentApi::new(http, &config.content_api)?;
        log::info!("Searching via {}", content_api.radius_url());
        let search = Arc::new(SearchSession::new(
            Arc::new(content_api),
            config.language.clone(),
        ));

        Ok(Self {
            config,
            reporter: null_reporter(),
            presenter,
            search,
        })
    }

    /// Routes success reports of every component built afterwards, and
    /// of the presenter, to `reporter`.
    #[must_use]
    pub fn with_reporter(self, reporter: Arc<dyn ActivityReporter>) -> Self {
        Self {
            presenter: self.presenter.with_reporter(Arc::clone(&reporter)),
            reporter,
            ..self
        }
    }

    /// The configuration the engine was built from.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolves and presents toponyms.
    #[must_use]
    pub const fn presenter(&self) -> &ToponymPresenter<OverpassClient> {
        &self.presenter
    }

    /// The shared radius search session.
    #[must_use]
    pub fn search(&self) -> Arc<SearchSession<HttpContentApi>> {
        Arc::clone(&self.search)
    }

    /// A focus coordinator for the surface behind `handle`.
    #[must_use]
    pub fn focus_coordinator(&self, handle: SurfaceHandle) -> FocusCoordinator {
        FocusCoordinator::new(
            handle,
            ViewportFitter::new(self.config.viewport.clone()),
            self.config.focus.clone(),
            Arc::clone(&self.reporter),
        )
    }

    /// A cluster layer over `toponyms`, labelled in the configured
    /// language.
    #[must_use]
    pub fn cluster_layer(&self, toponyms: &[Toponym]) -> ClusterLayer {
        ClusterLayer::from_toponyms(toponyms, &self.config.language, self.config.cluster.clone())
    }

    /// Starts following `surface`'s center for a radius search.
    #[must_use]
    pub fn center_picker(&self, surface: &dyn MapSurface) -> CenterPicker {
        CenterPicker::attach(surface, self.config.search.radius_meters)
    }

    /// Mounts the first surface from `factory` under health monitoring.
    #[must_use]
    pub fn start_shell(&self, factory: Arc<dyn SurfaceFactory>) -> MapShell {
        MapShell::start(factory, self.config.health.clone())
    }
}
