#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Marker clustering and focus.
//!
//! Markers are grouped greedily in Web Mercator pixel space: walking the
//! markers in input order, each unassigned marker claims every other
//! unassigned marker within the cluster radius. An R-tree answers the
//! radius queries. At or above the disable zoom every marker is drawn on
//! its own.
//!
//! Activating a rendered node is handled by [`focus::FocusCoordinator`].

pub mod focus;
pub mod projection;

use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};
use toponym_map_geometry_models::{BoundingBox, LatLng};
use toponym_map_surface::{MapSurface, MarkerGlyph, SurfaceError};
use toponym_map_toponym_models::Toponym;

pub use focus::{ClusterFocusRequest, FocusCoordinator, FocusOptions, FocusOutcome};

/// Cluster radius in pixels.
pub const DEFAULT_RADIUS_PX: f64 = 80.0;
/// Zoom from which clustering is disabled.
pub const DEFAULT_DISABLE_AT_ZOOM: f64 = 18.0;

/// Clustering configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOptions {
    /// Maximum pixel distance between a cluster's seed and its members.
    pub radius_px: f64,
    /// Zoom at or above which every marker renders individually.
    pub disable_at_zoom: f64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            radius_px: DEFAULT_RADIUS_PX,
            disable_at_zoom: DEFAULT_DISABLE_AT_ZOOM,
        }
    }
}

/// One point marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    /// Toponym id.
    pub id: i64,
    /// Marker position.
    pub position: LatLng,
    /// Display label.
    pub label: String,
}

impl Marker {
    /// Builds the marker for `toponym`, labelled in `language`.
    #[must_use]
    pub fn from_toponym(toponym: &Toponym, language: &str) -> Self {
        Self {
            id: toponym.id,
            position: toponym.position,
            label: toponym.display_name(language).to_string(),
        }
    }
}

/// A rendered unit: one marker, or several grouped together.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClusterNode {
    /// A lone marker.
    Single(Marker),
    /// Two or more markers within the cluster radius.
    Cluster {
        /// Members in input order.
        members: Vec<Marker>,
        /// Mean member position.
        centroid: LatLng,
        /// Bounds of the member positions.
        bounds: BoundingBox,
    },
}

impl ClusterNode {
    /// Number of markers represented.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Cluster { members, .. } => members.len(),
        }
    }

    /// Where the node is drawn.
    #[must_use]
    pub const fn position(&self) -> LatLng {
        match self {
            Self::Single(marker) => marker.position,
            Self::Cluster { centroid, .. } => *centroid,
        }
    }

    /// The glyph handed to the surface.
    #[must_use]
    pub fn glyph(&self) -> MarkerGlyph {
        match self {
            Self::Single(marker) => MarkerGlyph::Single {
                id: marker.id,
                position: marker.position,
                label: marker.label.clone(),
            },
            Self::Cluster {
                members,
                centroid,
                bounds,
            } => MarkerGlyph::Cluster {
                count: members.len(),
                position: *centroid,
                bounds: *bounds,
            },
        }
    }

    fn from_members(mut members: Vec<Marker>) -> Self {
        if members.len() == 1 {
            return Self::Single(members.remove(0));
        }

        #[allow(clippy::cast_precision_loss)]
        let count = members.len() as f64;
        let (lat_sum, lon_sum) = members.iter().fold((0.0, 0.0), |(lat, lon), marker| {
            (lat + marker.position.lat, lon + marker.position.lon)
        });
        let bounds = members
            .iter()
            .skip(1)
            .fold(BoundingBox::around(members[0].position), |bounds, marker| {
                bounds.including(marker.position)
            });

        Self::Cluster {
            centroid: LatLng::new(lat_sum / count, lon_sum / count),
            bounds,
            members,
        }
    }
}

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Groups `markers` into cluster nodes at `zoom`.
///
/// Output order follows the first member of each node in `markers`.
/// Markers without a finite position cannot be placed and are skipped.
/// Without a finite zoom every marker is drawn on its own.
#[must_use]
pub fn cluster_markers(markers: &[Marker], zoom: f64, options: &ClusterOptions) -> Vec<ClusterNode> {
    let markers: Vec<&Marker> = markers
        .iter()
        .filter(|marker| {
            let placeable = marker.position.is_finite();
            if !placeable {
                log::debug!("Skipping marker {} at {}", marker.id, marker.position);
            }
            placeable
        })
        .collect();

    if !zoom.is_finite() || zoom >= options.disable_at_zoom {
        return markers
            .into_iter()
            .cloned()
            .map(ClusterNode::Single)
            .collect();
    }

    let projected: Vec<[f64; 2]> = markers
        .iter()
        .map(|marker| projection::project(marker.position, zoom))
        .collect();
    let tree = RTree::bulk_load(
        projected
            .iter()
            .enumerate()
            .map(|(index, point)| IndexedPoint::new(*point, index))
            .collect(),
    );

    let radius_sq = options.radius_px * options.radius_px;
    let mut assigned = vec![false; markers.len()];
    let mut nodes = Vec::new();

    for (seed, point) in projected.iter().enumerate() {
        if assigned[seed] {
            continue;
        }

        let mut members: Vec<usize> = tree
            .locate_within_distance(*point, radius_sq)
            .map(|neighbor| neighbor.data)
            .filter(|&index| !assigned[index])
            .collect();
        members.sort_unstable();

        for &index in &members {
            assigned[index] = true;
        }
        nodes.push(ClusterNode::from_members(
            members
                .into_iter()
                .map(|index| markers[index].clone())
                .collect(),
        ));
    }

    log::debug!(
        "Clustered {} markers into {} nodes at zoom {zoom}",
        markers.len(),
        nodes.len()
    );
    nodes
}

/// The marker layer of a multi-point view.
#[derive(Debug, Clone, Default)]
pub struct ClusterLayer {
    markers: Vec<Marker>,
    options: ClusterOptions,
    nodes: Vec<ClusterNode>,
}

impl ClusterLayer {
    /// Creates a layer for `markers`.
    #[must_use]
    pub const fn new(markers: Vec<Marker>, options: ClusterOptions) -> Self {
        Self {
            markers,
            options,
            nodes: Vec::new(),
        }
    }

    /// Creates a layer with one marker per toponym.
    #[must_use]
    pub fn from_toponyms(toponyms: &[Toponym], language: &str, options: ClusterOptions) -> Self {
        Self::new(
            toponyms
                .iter()
                .map(|toponym| Marker::from_toponym(toponym, language))
                .collect(),
            options,
        )
    }

    /// Markers on this layer.
    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Nodes produced by the last [`ClusterLayer::render`].
    #[must_use]
    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    /// Node at `index` from the last render.
    #[must_use]
    pub fn node(&self, index: usize) -> Option<&ClusterNode> {
        self.nodes.get(index)
    }

    /// Re-clusters at the surface's current zoom and pushes the
    /// cluster-ready list to it.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] if the surface rejects the markers.
    pub fn render(&mut self, surface: &dyn MapSurface) -> Result<&[ClusterNode], SurfaceError> {
        self.nodes = cluster_markers(&self.markers, surface.zoom(), &self.options);
        let glyphs: Vec<MarkerGlyph> = self.nodes.iter().map(ClusterNode::glyph).collect();
        surface.render_markers(&glyphs)?;
        Ok(&self.nodes)
    }
}
