//! Spherical predicates and area computation (spec.md §4.1 C1)

use crate::geometry::Ring;

/// Mean Earth radius in meters, as specified.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two (lon, lat) points, in meters.
pub fn haversine((lon1, lat1): (f64, f64), (lon2, lat2): (f64, f64)) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Spherical-excess polygon area in square meters. Sign-insensitive: returns
/// the same value regardless of ring winding direction. Empty or
/// degenerate rings return 0.
pub fn polygon_area(ring: &Ring) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    // Spherical excess via the "L'Huilier"-free spherical polygon formula:
    // sum of signed longitude differences weighted by latitude, a standard
    // approximation for moderate-sized polygons.
    let mut total = 0.0;
    let n = ring.len();
    for i in 0..n {
        let (lon1, lat1) = ring[i];
        let (lon2, lat2) = ring[(i + 1) % n];
        total += (lon2 - lon1).to_radians() * (2.0 + lat1.to_radians().sin() + lat2.to_radians().sin());
    }
    (total * EARTH_RADIUS_M * EARTH_RADIUS_M / 2.0).abs()
}

/// Planar signed-area sign: true if the ring winds counter-clockwise.
/// Empty/degenerate rings are treated as not CCW (false).
pub fn is_ccw(ring: &Ring) -> bool {
    if ring.len() < 3 {
        return false;
    }
    signed_area_planar(ring) > 0.0
}

fn signed_area_planar(ring: &Ring) -> f64 {
    let n = ring.len();
    let mut sum = 0.0;
    for i in 0..n {
        let (x1, y1) = ring[i];
        let (x2, y2) = ring[(i + 1) % n];
        sum += x1 * y2 - x2 * y1;
    }
    sum / 2.0
}

/// Ray-casting point-in-polygon against the exterior ring; points inside any
/// hole are treated as outside. Never panics on empty/degenerate input.
pub fn point_in_polygon(p: (f64, f64), polygon: &[Ring]) -> bool {
    let Some(exterior) = polygon.first() else {
        return false;
    };
    if !ray_cast(p, exterior) {
        return false;
    }
    for hole in polygon.iter().skip(1) {
        if ray_cast(p, hole) {
            return false;
        }
    }
    true
}

fn ray_cast((px, py): (f64, f64), ring: &Ring) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let n = ring.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        let intersects = ((yi > py) != (yj > py))
            && (px < (xj - xi) * (py - yi) / (yj - yi) + xi);
        if intersects {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Whether any two non-adjacent segments of the ring intersect. In closed
/// rings the first/last segment pair is treated as adjacent.
pub fn has_self_intersection(ring: &Ring) -> bool {
    let n = ring.len();
    if n < 4 {
        return false;
    }
    let segments: Vec<((f64, f64), (f64, f64))> =
        (0..n).map(|i| (ring[i], ring[(i + 1) % n])).collect();
    let m = segments.len();
    for i in 0..m {
        for j in (i + 1)..m {
            if are_adjacent(i, j, m) {
                continue;
            }
            let (a1, a2) = segments[i];
            let (b1, b2) = segments[j];
            if segments_intersect(a1, a2, b1, b2) {
                return true;
            }
        }
    }
    false
}

fn are_adjacent(i: usize, j: usize, m: usize) -> bool {
    j == i + 1 || (i == 0 && j == m - 1)
}

fn orientation(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

fn on_segment(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> bool {
    p.0 >= a.0.min(b.0) && p.0 <= a.0.max(b.0) && p.1 >= a.1.min(b.1) && p.1 <= a.1.max(b.1)
}

fn segments_intersect(p1: (f64, f64), p2: (f64, f64), p3: (f64, f64), p4: (f64, f64)) -> bool {
    let d1 = orientation(p3, p4, p1);
    let d2 = orientation(p3, p4, p2);
    let d3 = orientation(p1, p2, p3);
    let d4 = orientation(p1, p2, p4);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    if d1 == 0.0 && on_segment(p3, p4, p1) {
        return true;
    }
    if d2 == 0.0 && on_segment(p3, p4, p2) {
        return true;
    }
    if d3 == 0.0 && on_segment(p1, p2, p3) {
        return true;
    }
    if d4 == 0.0 && on_segment(p1, p2, p4) {
        return true;
    }
    false
}

/// Removes consecutive duplicates, closes the ring if open, and reverses it
/// if not CCW. Returns `None` if fewer than 3 distinct points remain.
pub fn repair_ring(ring: &Ring) -> Option<Ring> {
    let mut out: Ring = Vec::new();
    for &p in ring {
        if out.last() != Some(&p) {
            out.push(p);
        }
    }
    // an open/closed duplicate trailing point counts once for dedup purposes
    if out.len() >= 2 && out.first() == out.last() {
        out.pop();
    }
    if out.len() < 3 {
        return None;
    }
    if out.first() != out.last() {
        out.push(out[0]);
    }
    if !is_ccw(&out) {
        out.reverse();
    }
    Some(out)
}

/// Arithmetic mean of the exterior ring's vertices. Documented as an
/// approximation, not the true area centroid.
pub fn centroid(ring: &Ring) -> Option<(f64, f64)> {
    if ring.is_empty() {
        return None;
    }
    let n = ring.len() as f64;
    let (sx, sy) = ring.iter().fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
    Some((sx / n, sy / n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Ring {
        vec![(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)]
    }

    #[test]
    fn haversine_zero_for_same_point() {
        assert_eq!(haversine((36.2, 37.1), (36.2, 37.1)), 0.0);
    }

    #[test]
    fn polygon_area_ignores_winding() {
        let r = square();
        let mut reversed = r.clone();
        reversed.reverse();
        assert!((polygon_area(&r) - polygon_area(&reversed)).abs() < 1e-6);
    }

    #[test]
    fn is_ccw_detects_winding() {
        let ccw = square();
        let mut cw = ccw.clone();
        cw.reverse();
        assert!(is_ccw(&ccw));
        assert!(!is_ccw(&cw));
    }

    #[test]
    fn point_in_polygon_basic() {
        let poly = vec![square()];
        assert!(point_in_polygon((0.5, 0.5), &poly));
        assert!(!point_in_polygon((2.0, 2.0), &poly));
    }

    #[test]
    fn point_in_polygon_hole_excludes() {
        let exterior = vec![(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0), (0.0, 0.0)];
        let hole = vec![(4.0, 4.0), (4.0, 6.0), (6.0, 6.0), (6.0, 4.0), (4.0, 4.0)];
        let poly = vec![exterior, hole];
        assert!(point_in_polygon((1.0, 1.0), &poly));
        assert!(!point_in_polygon((5.0, 5.0), &poly));
    }

    #[test]
    fn point_in_polygon_empty_is_false() {
        assert!(!point_in_polygon((0.0, 0.0), &[]));
    }

    #[test]
    fn self_intersection_detects_bowtie() {
        let bowtie = vec![(0.0, 0.0), (1.0, 1.0), (1.0, 0.0), (0.0, 1.0), (0.0, 0.0)];
        assert!(has_self_intersection(&bowtie));
        assert!(!has_self_intersection(&square()));
    }

    #[test]
    fn repair_ring_closes_and_orients() {
        let open_ring = vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        let repaired = repair_ring(&open_ring).unwrap();
        assert_eq!(repaired.first(), repaired.last());
        assert!(is_ccw(&repaired));
    }

    #[test]
    fn repair_ring_rejects_degenerate() {
        assert!(repair_ring(&vec![(0.0, 0.0), (0.0, 0.0)]).is_none());
    }

    #[test]
    fn centroid_is_vertex_mean() {
        let r = vec![(0.0, 0.0), (0.0, 2.0), (2.0, 2.0), (2.0, 0.0)];
        assert_eq!(centroid(&r), Some((1.0, 1.0)));
    }
}
