#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate, geometry and viewport types shared by the toponym map
//! packages.
//!
//! A [`GeometryResult`] is the render-ready outcome of resolving a
//! toponym's external boundary identifier. A [`Viewport`] is the camera
//! framing derived from it. Both are derived values and never persisted.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A WGS84 coordinate pair.
///
/// Equality is exact on both components; ring closure detection relies
/// on it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
}

impl LatLng {
    /// Creates a coordinate from latitude and longitude.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Returns `true` when both components are finite numbers.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Returns `true` when the coordinate is finite and within the valid
    /// latitude/longitude ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_finite() && (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.lat, self.lon)
    }
}

/// An ordered sequence of coordinates forming one ring or path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoordinateSequence(pub Vec<LatLng>);

impl CoordinateSequence {
    /// Wraps a list of coordinates.
    #[must_use]
    pub const fn new(coords: Vec<LatLng>) -> Self {
        Self(coords)
    }

    /// Number of coordinates in the sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the sequence has no coordinates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` when the sequence has more than two coordinates and
    /// its first and last coordinates are exactly equal.
    ///
    /// Sequences of two or fewer coordinates are never closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        if self.0.len() <= 2 {
            return false;
        }
        matches!((self.0.first(), self.0.last()), (Some(first), Some(last)) if first == last)
    }

    /// Iterates over the coordinates.
    pub fn iter(&self) -> std::slice::Iter<'_, LatLng> {
        self.0.iter()
    }
}

impl From<Vec<LatLng>> for CoordinateSequence {
    fn from(coords: Vec<LatLng>) -> Self {
        Self(coords)
    }
}

impl<'a> IntoIterator for &'a CoordinateSequence {
    type Item = &'a LatLng;
    type IntoIter = std::slice::Iter<'a, LatLng>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Which geodata query shape a toponym's boundary identifier refers to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeatureKind {
    /// Area-like administrative feature, resolved as a relation.
    Administrative,
    /// Simple feature (street, river, building), resolved as a way.
    Simple,
}

impl FeatureKind {
    /// Maps the "is an administrative settlement" hint to a kind.
    #[must_use]
    pub const fn from_hint(is_administrative: bool) -> Self {
        if is_administrative {
            Self::Administrative
        } else {
            Self::Simple
        }
    }

    /// Returns `true` for [`FeatureKind::Administrative`].
    #[must_use]
    pub const fn is_administrative(self) -> bool {
        matches!(self, Self::Administrative)
    }
}

/// The classified, render-ready geometry of a toponym.
///
/// Every ring belongs to exactly one result. For single-ring results,
/// ring closure is the only thing separating [`GeometryResult::Path`]
/// from [`GeometryResult::Area`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GeometryResult {
    /// No geometry available.
    #[default]
    None,
    /// Rendered as a circular marker at the toponym's own coordinates.
    Point,
    /// A single open sequence, rendered as a line.
    Path {
        /// Exactly one open ring.
        rings: Vec<CoordinateSequence>,
    },
    /// A single closed ring, rendered as a filled shape.
    Area {
        /// Exactly one closed ring.
        rings: Vec<CoordinateSequence>,
    },
    /// Outer rings of one administrative relation sharing one style.
    MultiArea {
        /// One or more outer rings, in source order.
        rings: Vec<CoordinateSequence>,
    },
}

impl GeometryResult {
    /// Builds a single-ring result, choosing [`GeometryResult::Area`] for
    /// closed rings and [`GeometryResult::Path`] otherwise.
    #[must_use]
    pub fn from_single_ring(ring: CoordinateSequence) -> Self {
        if ring.is_closed() {
            Self::Area { rings: vec![ring] }
        } else {
            Self::Path { rings: vec![ring] }
        }
    }

    /// Rings of the shape variants; empty for `None` and `Point`.
    #[must_use]
    pub fn rings(&self) -> &[CoordinateSequence] {
        match self {
            Self::Path { rings } | Self::Area { rings } | Self::MultiArea { rings } => rings,
            Self::None | Self::Point => &[],
        }
    }

    /// Returns `true` for `Path`, `Area` and `MultiArea`.
    #[must_use]
    pub const fn is_shape(&self) -> bool {
        matches!(
            self,
            Self::Path { .. } | Self::Area { .. } | Self::MultiArea { .. }
        )
    }

    /// Converts a missing geometry into a point marker so that something
    /// is always rendered at the toponym's coordinates.
    #[must_use]
    pub fn render_ready(self) -> Self {
        match self {
            Self::None => Self::Point,
            other => other,
        }
    }

    /// Short label for logs and CLI output.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Point => "point",
            Self::Path { .. } => "path",
            Self::Area { .. } => "area",
            Self::MultiArea { .. } => "multi_area",
        }
    }
}

/// An axis-aligned latitude/longitude bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    /// Southern latitude boundary.
    pub min_lat: f64,
    /// Northern latitude boundary.
    pub max_lat: f64,
    /// Western longitude boundary.
    pub min_lon: f64,
    /// Eastern longitude boundary.
    pub max_lon: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given extremes.
    #[must_use]
    pub const fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// A zero-area box around a single coordinate.
    #[must_use]
    pub const fn around(point: LatLng) -> Self {
        Self::new(point.lat, point.lat, point.lon, point.lon)
    }

    /// Grows the box so it contains `point`.
    #[must_use]
    pub fn including(self, point: LatLng) -> Self {
        Self::new(
            self.min_lat.min(point.lat),
            self.max_lat.max(point.lat),
            self.min_lon.min(point.lon),
            self.max_lon.max(point.lon),
        )
    }

    /// Returns `true` when the box has zero extent in both axes.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_degenerate(&self) -> bool {
        self.min_lat == self.max_lat && self.min_lon == self.max_lon
    }

    /// Midpoint of the box.
    #[must_use]
    pub fn center(&self) -> LatLng {
        LatLng::new(
            f64::midpoint(self.min_lat, self.max_lat),
            f64::midpoint(self.min_lon, self.max_lon),
        )
    }

    /// Returns `true` if `point` lies inside or on the edge of the box.
    #[must_use]
    pub fn contains(&self, point: LatLng) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lon..=self.max_lon).contains(&point.lon)
    }
}

/// Camera framing requested from the map surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Viewport {
    /// Center on a single point at a fixed zoom.
    #[serde(rename_all = "camelCase")]
    PointView {
        /// Map center.
        center: LatLng,
        /// Zoom level.
        zoom: f64,
    },
    /// Frame a bounding box with pixel padding on every side.
    #[serde(rename_all = "camelCase")]
    BoundsView {
        /// Region to frame.
        bounds: BoundingBox,
        /// Padding in screen pixels.
        padding_px: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(points: &[(f64, f64)]) -> CoordinateSequence {
        points.iter().map(|&(lat, lon)| LatLng::new(lat, lon)).collect::<Vec<_>>().into()
    }

    #[test]
    fn short_sequences_are_never_closed() {
        assert!(!seq(&[]).is_closed());
        assert!(!seq(&[(1.0, 1.0)]).is_closed());
        assert!(!seq(&[(1.0, 1.0), (1.0, 1.0)]).is_closed());
    }

    #[test]
    fn closure_requires_exact_equality() {
        assert!(seq(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]).is_closed());
        assert!(!seq(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1e-12)]).is_closed());
        assert!(!seq(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (1e-12, 0.0)]).is_closed());
    }

    #[test]
    fn single_ring_classification_follows_closure() {
        let open = seq(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]);
        let closed = seq(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]);
        assert!(matches!(
            GeometryResult::from_single_ring(open),
            GeometryResult::Path { .. }
        ));
        assert!(matches!(
            GeometryResult::from_single_ring(closed),
            GeometryResult::Area { .. }
        ));
    }

    #[test]
    fn render_ready_turns_none_into_point() {
        assert_eq!(GeometryResult::None.render_ready(), GeometryResult::Point);
        let path = GeometryResult::from_single_ring(seq(&[(0.0, 0.0), (1.0, 1.0)]));
        assert_eq!(path.clone().render_ready(), path);
    }

    #[test]
    fn feature_kind_round_trips_through_strings() {
        assert_eq!(FeatureKind::from_hint(true), FeatureKind::Administrative);
        assert_eq!(FeatureKind::Simple.to_string(), "simple");
        assert_eq!(
            "administrative".parse::<FeatureKind>().unwrap(),
            FeatureKind::Administrative
        );
    }

    #[test]
    fn geometry_result_serializes_with_type_tag() {
        let json = serde_json::to_value(GeometryResult::MultiArea {
            rings: vec![seq(&[(50.0, 14.0), (50.1, 14.1)])],
        })
        .unwrap();
        assert_eq!(json["type"], "multiArea");
        assert_eq!(json["rings"][0][1]["lat"], 50.1);
    }

    #[test]
    fn bounding_box_grows_to_include_points() {
        let bbox = BoundingBox::around(LatLng::new(1.0, 2.0))
            .including(LatLng::new(-1.0, 5.0))
            .including(LatLng::new(0.5, -3.0));
        assert_eq!(bbox, BoundingBox::new(-1.0, 1.0, -3.0, 5.0));
        assert!(bbox.contains(LatLng::new(0.0, 0.0)));
        assert!(!bbox.is_degenerate());
        assert!(BoundingBox::around(LatLng::new(1.0, 2.0)).is_degenerate());
    }

    #[test]
    fn validity_rejects_out_of_range_and_non_finite() {
        assert!(LatLng::new(49.19, 16.6).is_valid());
        assert!(!LatLng::new(f64::NAN, 16.6).is_valid());
        assert!(!LatLng::new(91.0, 0.0).is_valid());
        assert!(!LatLng::new(0.0, f64::INFINITY).is_finite());
    }
}
