//! Polygon validation policy (spec.md §4.1 "Validation policy")

use crate::geometry::Ring;
use crate::predicates::{has_self_intersection, is_ccw, polygon_area};

pub const MIN_POLYGON_AREA_M2: f64 = 1.0;
pub const LARGE_AREA_WARN_M2: f64 = 1_000_000.0;
pub const MANY_VERTICES_WARN: usize = 1000;

#[derive(Clone, Debug, PartialEq)]
pub struct PolygonCheck {
    pub errors: Vec<(&'static str, String)>,
    pub warnings: Vec<(&'static str, String)>,
}

impl PolygonCheck {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks a polygon's exterior ring (plus holes, for self-intersection)
/// against the validation policy in spec.md §4.1. Assumes the ring has
/// already been auto-closed elsewhere if it needed to be; this function
/// does not mutate input.
pub fn check_polygon(rings: &[Ring], regional_bbox: Option<(f64, f64, f64, f64)>) -> PolygonCheck {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let Some(exterior) = rings.first() else {
        errors.push(("EMPTY_POLYGON", "polygon has no exterior ring".to_string()));
        return PolygonCheck { errors, warnings };
    };

    let distinct = distinct_vertex_count(exterior);
    if distinct < 3 {
        errors.push((
            "TOO_FEW_VERTICES",
            format!("exterior ring has only {distinct} distinct vertices"),
        ));
    }

    if exterior.len() >= 2 && exterior.first() != exterior.last() {
        errors.push(("RING_NOT_CLOSED", "first vertex != last vertex".to_string()));
    }

    let area = polygon_area(exterior);
    if area < MIN_POLYGON_AREA_M2 {
        errors.push((
            "POLYGON_TOO_SMALL",
            format!("area {area:.3} m^2 is below the {MIN_POLYGON_AREA_M2} m^2 floor"),
        ));
    } else if area > LARGE_AREA_WARN_M2 {
        warnings.push((
            "POLYGON_VERY_LARGE",
            format!("area {area:.1} m^2 exceeds {LARGE_AREA_WARN_M2} m^2"),
        ));
    }

    if exterior.len() > MANY_VERTICES_WARN {
        warnings.push((
            "POLYGON_MANY_VERTICES",
            format!("{} vertices exceeds {MANY_VERTICES_WARN}", exterior.len()),
        ));
    }

    if !exterior.is_empty() && !is_ccw(exterior) {
        warnings.push(("POLYGON_CLOCKWISE", "exterior ring is wound clockwise".to_string()));
    }

    if has_self_intersection(exterior) {
        errors.push(("SELF_INTERSECTION", "exterior ring self-intersects".to_string()));
    }

    if let Some((min_lon, min_lat, max_lon, max_lat)) = regional_bbox {
        for &(lon, lat) in exterior {
            if lon < min_lon || lon > max_lon || lat < min_lat || lat > max_lat {
                warnings.push((
                    "VERTEX_OUTSIDE_REGION",
                    format!("vertex ({lon}, {lat}) outside configured region"),
                ));
                break;
            }
        }
    }

    PolygonCheck { errors, warnings }
}

fn distinct_vertex_count(ring: &Ring) -> usize {
    let mut body = ring.to_vec();
    if body.len() >= 2 && body.first() == body.last() {
        body.pop();
    }
    body.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    body.dedup();
    body.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(area_scale: f64) -> Vec<Ring> {
        vec![vec![
            (0.0, 0.0),
            (0.0, area_scale),
            (area_scale, 0.0),
            (0.0, 0.0),
        ]]
    }

    #[test]
    fn three_vertex_polygon_with_sufficient_area_validates() {
        // ~0.00002 degrees per side is well over 1 m^2 near the equator.
        let check = check_polygon(&triangle(0.0005), None);
        assert!(check.is_valid(), "{check:?}");
    }

    #[test]
    fn tiny_polygon_rejected_as_too_small() {
        let check = check_polygon(&triangle(0.00001), None);
        assert!(!check.is_valid());
        assert!(check.errors.iter().any(|(c, _)| *c == "POLYGON_TOO_SMALL"));
    }

    #[test]
    fn self_intersecting_polygon_is_an_error() {
        let bowtie = vec![vec![(0.0, 0.0), (1.0, 1.0), (1.0, 0.0), (0.0, 1.0), (0.0, 0.0)]];
        let check = check_polygon(&bowtie, None);
        assert!(check.errors.iter().any(|(c, _)| *c == "SELF_INTERSECTION"));
    }
}
