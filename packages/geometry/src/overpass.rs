//! Overpass query text, response DTOs and HTTP client.
//!
//! Queries are sent as the `data` form field of a POST request. With
//! `out geom;` the service inlines member and way geometry, so no
//! follow-up node lookups are needed.
//!
//! See <https://wiki.openstreetmap.org/wiki/Overpass_API/Overpass_QL>

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use toponym_map_geometry_models::{FeatureKind, LatLng};

use crate::{GeodataService, GeometryError, ResolverOptions, service_registry};

/// Builds the query for `id`: a relation query for administrative
/// features, a way query otherwise.
#[must_use]
pub fn overpass_query(id: i64, kind: FeatureKind) -> String {
    let element = match kind {
        FeatureKind::Administrative => "relation",
        FeatureKind::Simple => "way",
    };
    format!("[out:json]; {element}({id}); out geom;")
}

/// Top-level Overpass JSON response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OverpassResponse {
    /// Matched elements in service order.
    #[serde(default)]
    pub elements: Vec<OverpassElement>,
}

/// One element of an Overpass response, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OverpassElement {
    /// A single node.
    Node {
        /// Node id.
        id: i64,
    },
    /// A way with its resolved geometry.
    Way {
        /// Way id.
        id: i64,
        /// Coordinates of the way's nodes.
        #[serde(default)]
        geometry: Vec<Option<OverpassPoint>>,
    },
    /// A relation with its resolved members.
    Relation {
        /// Relation id.
        id: i64,
        /// Members in source order.
        #[serde(default)]
        members: Vec<OverpassMember>,
    },
    /// Any other element type (areas, derived elements).
    #[serde(other)]
    Other,
}

impl OverpassElement {
    /// Element type name as used in the query language.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Node { .. } => "node",
            Self::Way { .. } => "way",
            Self::Relation { .. } => "relation",
            Self::Other => "other",
        }
    }
}

/// A member of a relation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OverpassMember {
    /// Member type (`way`, `node`, `relation`).
    #[serde(rename = "type")]
    pub member_type: String,
    /// Role within the relation (`outer`, `inner`, `admin_centre`, ...).
    #[serde(default)]
    pub role: String,
    /// Inlined coordinates; absent for node and relation members.
    #[serde(default)]
    pub geometry: Vec<Option<OverpassPoint>>,
}

/// A coordinate pair inside an Overpass geometry array.
///
/// Entries can be `null` when a referenced node lies outside the
/// returned data set.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct OverpassPoint {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
}

impl From<OverpassPoint> for LatLng {
    fn from(point: OverpassPoint) -> Self {
        Self::new(point.lat, point.lon)
    }
}

/// Decodes a raw Overpass response body.
///
/// # Errors
///
/// Returns [`GeometryError::Json`] if the body is not a valid response.
pub fn parse_response(body: &str) -> Result<OverpassResponse, GeometryError> {
    Ok(serde_json::from_str(body)?)
}

/// HTTP client for an Overpass interpreter endpoint.
#[derive(Debug, Clone)]
pub struct OverpassClient {
    client: reqwest::Client,
    id: String,
    endpoint: String,
    timeout: Duration,
}

impl OverpassClient {
    /// Creates a client for `endpoint`.
    #[must_use]
    pub fn new(client: reqwest::Client, id: &str, endpoint: &str, timeout: Duration) -> Self {
        Self {
            client,
            id: id.to_string(),
            endpoint: endpoint.to_string(),
            timeout,
        }
    }

    /// Builds a client from resolver options, falling back to the
    /// highest-priority enabled service in the registry when no endpoint
    /// is configured.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Config`] if no endpoint is configured and
    /// no registry service is enabled, or [`GeometryError::Http`] if the
    /// HTTP client cannot be built.
    pub fn from_options(options: &ResolverOptions) -> Result<Self, GeometryError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("toponym-map/", env!("CARGO_PKG_VERSION")))
            .build()?;

        if let Some(endpoint) = options.endpoint.as_deref() {
            return Ok(Self::new(
                client,
                "configured",
                endpoint,
                Duration::from_millis(options.timeout_ms),
            ));
        }

        let service =
            service_registry::primary_service().ok_or_else(|| GeometryError::Config {
                message: "no geodata service is enabled".to_string(),
            })?;

        Ok(Self::new(
            client,
            &service.id,
            &service.endpoint,
            Duration::from_millis(service.timeout_ms.min(options.timeout_ms)),
        ))
    }

    /// The interpreter endpoint this client posts to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GeodataService for OverpassClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn query(&self, query: &str) -> Result<OverpassResponse, GeometryError> {
        log::debug!("Overpass query to {}: {query}", self.endpoint);

        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .form(&[("data", query)])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GeometryError::Status {
                status: resp.status().as_u16(),
            });
        }

        let body = resp.text().await?;
        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_relation_and_way_queries() {
        assert_eq!(
            overpass_query(438_171, FeatureKind::Administrative),
            "[out:json]; relation(438171); out geom;"
        );
        assert_eq!(
            overpass_query(25_437_118, FeatureKind::Simple),
            "[out:json]; way(25437118); out geom;"
        );
    }

    #[test]
    fn parses_relation_payload() {
        let body = r#"{
            "version": 0.6,
            "elements": [{
                "type": "relation",
                "id": 438171,
                "members": [
                    {"type": "way", "ref": 1, "role": "outer",
                     "geometry": [{"lat": 49.1, "lon": 16.5}, {"lat": 49.2, "lon": 16.6}]},
                    {"type": "node", "ref": 2, "role": "admin_centre", "lat": 49.19, "lon": 16.6}
                ],
                "tags": {"name": "Brno"}
            }]
        }"#;
        let response = parse_response(body).unwrap();
        let OverpassElement::Relation { id, members } = &response.elements[0] else {
            panic!("expected relation, got {:?}", response.elements[0]);
        };
        assert_eq!(*id, 438_171);
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].role, "outer");
        assert_eq!(members[0].geometry.len(), 2);
        assert!(members[1].geometry.is_empty());
    }

    #[test]
    fn tolerates_unknown_element_types_and_null_points() {
        let body = r#"{"elements": [
            {"type": "area", "id": 3600438171},
            {"type": "way", "id": 5, "geometry": [{"lat": 1.0, "lon": 2.0}, null]}
        ]}"#;
        let response = parse_response(body).unwrap();
        assert_eq!(response.elements[0], OverpassElement::Other);
        assert_eq!(response.elements[1].type_name(), "way");
    }

    #[test]
    fn rejects_non_json_payload() {
        let err = parse_response("<html>rate limited</html>").unwrap_err();
        assert!(matches!(err, GeometryError::Json(_)));
    }

    #[test]
    fn missing_elements_decode_as_empty() {
        assert!(parse_response("{}").unwrap().elements.is_empty());
    }
}
