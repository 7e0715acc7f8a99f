#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Toponym record types.
//!
//! Toponyms are owned by the content API and immutable from the map
//! engine's point of view. The API ships coordinates as numeric strings,
//! so [`ApiToponym`] is validated into a [`Toponym`] before anything
//! downstream touches it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toponym_map_geometry_models::{FeatureKind, LatLng};

/// Language used when the requested one has no value.
pub const DEFAULT_LANGUAGE: &str = "cs";

/// A multilingual text field keyed by language code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedText(pub BTreeMap<String, String>);

impl LocalizedText {
    /// Builds a text field from `(language, value)` pairs.
    #[must_use]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(lang, value)| (lang.to_string(), value.to_string()))
                .collect(),
        )
    }

    /// Resolves the text for `language`.
    ///
    /// Falls back to [`DEFAULT_LANGUAGE`], then to the alphabetically
    /// first language with a non-blank value. Returns `None` only when
    /// every value is blank.
    #[must_use]
    pub fn get(&self, language: &str) -> Option<&str> {
        let lookup = |lang: &str| {
            self.0
                .get(lang)
                .map(String::as_str)
                .filter(|value| !value.trim().is_empty())
        };

        lookup(language)
            .or_else(|| lookup(DEFAULT_LANGUAGE))
            .or_else(|| {
                self.0
                    .values()
                    .map(String::as_str)
                    .find(|value| !value.trim().is_empty())
            })
    }

    /// Like [`LocalizedText::get`] but returns an empty string when no
    /// value exists.
    #[must_use]
    pub fn get_or_empty(&self, language: &str) -> &str {
        self.get(language).unwrap_or_default()
    }
}

/// A named geographic place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toponym {
    /// Content API primary key.
    pub id: i64,
    /// Localized name.
    pub name: LocalizedText,
    /// Localized description.
    pub description: LocalizedText,
    /// Validated WGS84 position.
    pub position: LatLng,
    /// External geodata identifier of the feature's shape.
    pub boundary_id: Option<i64>,
    /// Query shape hint for the boundary identifier.
    pub feature_kind: Option<FeatureKind>,
    /// Number of other entries sharing this toponym's canonical name.
    pub duplicate_count: Option<u32>,
}

impl Toponym {
    /// Display name in `language`, with fallback.
    #[must_use]
    pub fn display_name(&self, language: &str) -> &str {
        self.name.get_or_empty(language)
    }

    /// Feature kind used for resolution; missing hints resolve as simple
    /// features.
    #[must_use]
    pub fn resolution_kind(&self) -> FeatureKind {
        self.feature_kind.unwrap_or(FeatureKind::Simple)
    }
}

/// A coordinate as shipped by the content API: usually a numeric string,
/// occasionally a bare number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCoordinate {
    /// Decimal number encoded as a string (e.g. `"49.1951"`).
    Text(String),
    /// Plain JSON number.
    Number(f64),
}

impl RawCoordinate {
    fn parse(&self, field: &'static str) -> Result<f64, CoordinateError> {
        let value = match self {
            Self::Text(text) => {
                text.trim()
                    .parse::<f64>()
                    .map_err(|_| CoordinateError::Unparsable {
                        field,
                        value: text.clone(),
                    })?
            }
            Self::Number(number) => *number,
        };

        if value.is_finite() {
            Ok(value)
        } else {
            Err(CoordinateError::NonFinite { field })
        }
    }
}

/// Toponym record as returned by the content API detail and listing
/// endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiToponym {
    /// Primary key.
    pub id: i64,
    /// Names keyed by language code.
    #[serde(default)]
    pub name: LocalizedText,
    /// Descriptions keyed by language code.
    #[serde(default)]
    pub description: LocalizedText,
    /// Latitude as a numeric string.
    pub latitude: RawCoordinate,
    /// Longitude as a numeric string.
    pub longitude: RawCoordinate,
    /// External boundary identifier.
    #[serde(default)]
    pub boundary_id: Option<i64>,
    /// "Is an administrative settlement" hint.
    #[serde(default)]
    pub is_settlement: Option<bool>,
    /// Count of entries sharing the canonical name.
    #[serde(default)]
    pub duplicate_count: Option<u32>,
}

/// Errors raised while validating content API coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
    /// The string could not be parsed as a decimal number.
    #[error("{field} is not a number: {value:?}")]
    Unparsable {
        /// Which field failed.
        field: &'static str,
        /// The raw value.
        value: String,
    },

    /// The value parsed to NaN or an infinity.
    #[error("{field} is not finite")]
    NonFinite {
        /// Which field failed.
        field: &'static str,
    },

    /// Latitude or longitude outside the WGS84 range.
    #[error("coordinate out of range: {lat}, {lon}")]
    OutOfRange {
        /// Parsed latitude, formatted.
        lat: String,
        /// Parsed longitude, formatted.
        lon: String,
    },
}

impl TryFrom<ApiToponym> for Toponym {
    type Error = CoordinateError;

    fn try_from(raw: ApiToponym) -> Result<Self, Self::Error> {
        let lat = raw.latitude.parse("latitude")?;
        let lon = raw.longitude.parse("longitude")?;
        let position = LatLng::new(lat, lon);

        if !position.is_valid() {
            return Err(CoordinateError::OutOfRange {
                lat: lat.to_string(),
                lon: lon.to_string(),
            });
        }

        Ok(Self {
            id: raw.id,
            name: raw.name,
            description: raw.description,
            position,
            boundary_id: raw.boundary_id,
            feature_kind: raw.is_settlement.map(FeatureKind::from_hint),
            duplicate_count: raw.duplicate_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(lat: RawCoordinate, lon: RawCoordinate) -> ApiToponym {
        ApiToponym {
            id: 7,
            name: LocalizedText::from_pairs([("cs", "Brno"), ("de", "Brünn")]),
            description: LocalizedText::default(),
            latitude: lat,
            longitude: lon,
            boundary_id: Some(438_171),
            is_settlement: Some(true),
            duplicate_count: None,
        }
    }

    #[test]
    fn localized_text_falls_back_deterministically() {
        let text = LocalizedText::from_pairs([("de", "Brünn"), ("cs", "Brno"), ("en", " ")]);
        assert_eq!(text.get("de"), Some("Brünn"));
        assert_eq!(text.get("en"), Some("Brno"));
        assert_eq!(text.get("fr"), Some("Brno"));

        let no_default = LocalizedText::from_pairs([("pl", "Brno PL"), ("de", "Brünn")]);
        assert_eq!(no_default.get("fr"), Some("Brünn"));

        assert_eq!(LocalizedText::default().get("cs"), None);
    }

    #[test]
    fn parses_numeric_string_coordinates() {
        let toponym = Toponym::try_from(raw(
            RawCoordinate::Text("49.1951".to_string()),
            RawCoordinate::Text(" 16.6068 ".to_string()),
        ))
        .unwrap();
        assert!((toponym.position.lat - 49.1951).abs() < 1e-9);
        assert!((toponym.position.lon - 16.6068).abs() < 1e-9);
        assert_eq!(toponym.feature_kind, Some(FeatureKind::Administrative));
        assert_eq!(toponym.display_name("de"), "Brünn");
    }

    #[test]
    fn rejects_non_finite_coordinates() {
        let err = Toponym::try_from(raw(
            RawCoordinate::Text("NaN".to_string()),
            RawCoordinate::Number(16.0),
        ))
        .unwrap_err();
        assert_eq!(err, CoordinateError::NonFinite { field: "latitude" });

        let err = Toponym::try_from(raw(
            RawCoordinate::Number(49.0),
            RawCoordinate::Text("inf".to_string()),
        ))
        .unwrap_err();
        assert_eq!(err, CoordinateError::NonFinite { field: "longitude" });
    }

    #[test]
    fn rejects_garbage_and_out_of_range() {
        assert!(matches!(
            Toponym::try_from(raw(
                RawCoordinate::Text("north".to_string()),
                RawCoordinate::Number(16.0),
            )),
            Err(CoordinateError::Unparsable { .. })
        ));
        assert!(matches!(
            Toponym::try_from(raw(RawCoordinate::Number(120.0), RawCoordinate::Number(16.0))),
            Err(CoordinateError::OutOfRange { .. })
        ));
    }

    #[test]
    fn deserializes_wire_shape() {
        let body = serde_json::json!({
            "id": 12,
            "name": {"cs": "Svratka"},
            "latitude": "49.18",
            "longitude": 16.58,
            "boundary_id": 25_437_118,
            "is_settlement": false
        });
        let raw: ApiToponym = serde_json::from_value(body).unwrap();
        let toponym = Toponym::try_from(raw).unwrap();
        assert_eq!(toponym.resolution_kind(), FeatureKind::Simple);
        assert_eq!(toponym.boundary_id, Some(25_437_118));
        assert_eq!(toponym.duplicate_count, None);
    }
}
