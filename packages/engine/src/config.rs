//! Layered engine configuration.
//!
//! Values are resolved in increasing precedence:
//!
//! 1. Built-in defaults (`config/default.toml`, embedded at compile time)
//! 2. An optional TOML file; only the keys it sets are overridden
//! 3. Environment variables (`TOPONYM_MAP_*`)
//! 4. Command-line overrides

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toponym_map_cluster::{ClusterOptions, FocusOptions};
use toponym_map_geometry::ResolverOptions;
use toponym_map_health::HealthOptions;
use toponym_map_search::{ContentApiOptions, SearchOptions};
use toponym_map_toponym_models::DEFAULT_LANGUAGE;
use toponym_map_viewport::FitOptions;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Overrides the geodata interpreter endpoint.
pub const ENV_OVERPASS_URL: &str = "TOPONYM_MAP_OVERPASS_URL";
/// Overrides the content API base URL.
pub const ENV_CONTENT_API_URL: &str = "TOPONYM_MAP_CONTENT_API_URL";
/// Overrides the results view URL.
pub const ENV_RESULTS_URL: &str = "TOPONYM_MAP_RESULTS_URL";
/// Overrides the display language.
pub const ENV_LANGUAGE: &str = "TOPONYM_MAP_LANGUAGE";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A config layer is not valid TOML or has the wrong shape.
    #[error("Invalid configuration in {origin}: {source}")]
    Parse {
        /// Which layer failed.
        origin: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Display language for names and ranking.
    pub language: String,
    /// Geometry resolution.
    pub resolver: ResolverOptions,
    /// Viewport fitting.
    pub viewport: FitOptions,
    /// Marker focus.
    pub focus: FocusOptions,
    /// Marker clustering.
    pub cluster: ClusterOptions,
    /// Health monitoring.
    pub health: HealthOptions,
    /// Radius search.
    pub search: SearchOptions,
    /// Content API connection.
    pub content_api: ContentApiOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            resolver: ResolverOptions::default(),
            viewport: FitOptions::default(),
            focus: FocusOptions::default(),
            cluster: ClusterOptions::default(),
            health: HealthOptions::default(),
            search: SearchOptions::default(),
            content_api: ContentApiOptions::default(),
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    /// Geodata interpreter endpoint.
    pub overpass_url: Option<String>,
    /// Content API base URL.
    pub content_api_url: Option<String>,
    /// Display language.
    pub language: Option<String>,
}

impl EngineConfig {
    /// The built-in defaults.
    ///
    /// # Panics
    ///
    /// Panics if the embedded default configuration is malformed (a
    /// compile-time invariant).
    #[must_use]
    pub fn builtin() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config is valid")
    }

    /// Loads defaults, then `path` (if given), then the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::builtin(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads defaults overlaid with the TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_overlay(&content, &path.display().to_string())
    }

    /// Loads defaults overlaid with the TOML document `content`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if `content` is not valid TOML or
    /// does not describe an engine configuration.
    pub fn from_overlay(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let parse_error = |source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        };

        let mut merged: toml::Table = toml::from_str(DEFAULT_CONFIG).map_err(|source| {
            ConfigError::Parse {
                origin: "built-in defaults".to_string(),
                source,
            }
        })?;
        let overlay: toml::Table = toml::from_str(content).map_err(parse_error)?;
        merge_tables(&mut merged, overlay);

        let config = toml::Value::Table(merged)
            .try_into()
            .map_err(parse_error)?;
        log::debug!("Loaded configuration overlay from {origin}");
        Ok(config)
    }

    /// Applies `TOPONYM_MAP_*` variables as returned by `lookup`. Blank
    /// values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(url) = var(ENV_OVERPASS_URL) {
            log::debug!("{ENV_OVERPASS_URL} overrides the geodata endpoint");
            self.resolver.endpoint = Some(url);
        }
        if let Some(url) = var(ENV_CONTENT_API_URL) {
            self.content_api.base_url = url;
        }
        if let Some(url) = var(ENV_RESULTS_URL) {
            self.search.results_url = url;
        }
        if let Some(language) = var(ENV_LANGUAGE) {
            self.language = language;
        }
    }

    /// Applies command-line overrides.
    pub fn apply_cli(&mut self, overrides: CliOverrides) {
        if let Some(url) = overrides.overpass_url {
            self.resolver.endpoint = Some(url);
        }
        if let Some(url) = overrides.content_api_url {
            self.content_api.base_url = url;
        }
        if let Some(language) = overrides.language {
            self.language = language;
        }
    }
}

/// Recursively merges `overlay` into `base`; overlay values win.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
