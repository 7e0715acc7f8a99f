//! Overpass interpreter instances known to the resolver.
//!
//! One TOML file per instance lives under `services/` and is embedded at
//! build time. [`primary_service`] is what the resolver falls back to
//! when no endpoint is configured.

use serde::Deserialize;

/// One Overpass interpreter instance.
#[derive(Debug, Clone, Deserialize)]
pub struct GeodataServiceConfig {
    /// Registry key, e.g. `overpass_main`.
    pub id: String,
    /// Display name for logs.
    pub name: String,
    /// Disabled instances are never chosen.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Preference order, lower values first.
    pub priority: u32,
    /// Interpreter URL the query is POSTed to.
    pub endpoint: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

const fn default_true() -> bool {
    true
}

const SERVICE_TOMLS: &[(&str, &str)] = &[
    ("overpass_main", include_str!("../services/overpass_main.toml")),
    ("overpass_kumi", include_str!("../services/overpass_kumi.toml")),
];

#[cfg(test)]
const EXPECTED_SERVICE_COUNT: usize = 2;

/// Every registered instance, including disabled ones.
///
/// # Panics
///
/// Panics if an embedded service file is malformed.
#[must_use]
pub fn all_services() -> Vec<GeodataServiceConfig> {
    SERVICE_TOMLS
        .iter()
        .map(|(key, source)| {
            toml::from_str(source)
                .unwrap_or_else(|e| panic!("Malformed geodata service file {key}.toml: {e}"))
        })
        .collect()
}

/// Enabled instances, most preferred first.
#[must_use]
pub fn enabled_services() -> Vec<GeodataServiceConfig> {
    let mut enabled = all_services();
    enabled.retain(|service| service.enabled);
    enabled.sort_by_key(|service| service.priority);
    enabled
}

/// The highest-priority enabled service, if any.
#[must_use]
pub fn primary_service() -> Option<GeodataServiceConfig> {
    enabled_services().into_iter().next()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn every_service_file_is_registered() {
        assert_eq!(all_services().len(), EXPECTED_SERVICE_COUNT);
    }

    #[test]
    fn registry_keys_match_service_ids() {
        let ids: BTreeSet<String> = all_services().into_iter().map(|s| s.id).collect();
        let keys: BTreeSet<String> = SERVICE_TOMLS.iter().map(|(key, _)| (*key).to_string()).collect();
        assert_eq!(ids, keys);
    }

    #[test]
    fn endpoints_are_https_with_a_timeout() {
        for service in all_services() {
            assert!(service.endpoint.starts_with("https://"), "{}", service.id);
            assert!(service.timeout_ms > 0, "{}", service.id);
            assert!(!service.name.is_empty(), "{}", service.id);
        }
    }

    #[test]
    fn primary_service_is_the_main_instance() {
        let primary = primary_service().unwrap();
        assert_eq!(primary.id, "overpass_main");
        for svc in enabled_services() {
            assert!(svc.priority >= primary.priority);
        }
    }
}
