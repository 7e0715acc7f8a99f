//! Classification of Overpass payloads into [`GeometryResult`]s.

use toponym_map_geometry_models::{CoordinateSequence, FeatureKind, GeometryResult};

use crate::overpass::{OverpassElement, OverpassMember, OverpassPoint, OverpassResponse};

const OUTER_ROLE: &str = "outer";
const WAY_MEMBER: &str = "way";

/// Classifies the first element of `response` according to `kind`.
///
/// * administrative + relation: the outer way members become the rings
///   of a [`GeometryResult::MultiArea`], in source order
/// * simple + way: a closed sequence is an [`GeometryResult::Area`],
///   anything else a [`GeometryResult::Path`]
/// * every other combination, or a shape without a single coordinate,
///   is [`GeometryResult::None`]
#[must_use]
pub fn classify(response: &OverpassResponse, kind: FeatureKind) -> GeometryResult {
    let Some(first) = response.elements.first() else {
        return GeometryResult::None;
    };

    match (kind, first) {
        (FeatureKind::Administrative, OverpassElement::Relation { members, .. }) => {
            let rings: Vec<CoordinateSequence> = members
                .iter()
                .filter(|member| is_outer_way(member))
                .map(|member| to_sequence(&member.geometry))
                .collect();

            if rings.iter().all(CoordinateSequence::is_empty) {
                GeometryResult::None
            } else {
                GeometryResult::MultiArea { rings }
            }
        }
        (FeatureKind::Simple, OverpassElement::Way { geometry, .. }) => {
            let coords = to_sequence(geometry);
            if coords.is_empty() {
                GeometryResult::None
            } else {
                GeometryResult::from_single_ring(coords)
            }
        }
        (kind, element) => {
            log::debug!(
                "No geometry for {kind} hint with {} element",
                element.type_name()
            );
            GeometryResult::None
        }
    }
}

fn is_outer_way(member: &OverpassMember) -> bool {
    member.role == OUTER_ROLE && member.member_type == WAY_MEMBER
}

fn to_sequence(points: &[Option<OverpassPoint>]) -> CoordinateSequence {
    points.iter().flatten().map(|&point| point.into()).collect::<Vec<_>>().into()
}
