//! Spatial query contract (spec.md §4.2 C2) and its scan-backend
//! realization. The indexed backend lives in `trr-storage`, which depends
//! on this crate for the exact predicates both backends share.

use crate::geometry::Ring;
use crate::predicates::{haversine, point_in_polygon, polygon_area};
use std::collections::HashMap;

/// A building as seen by the spatial layer: just enough to satisfy C2's
/// contract, not the full entity.
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialBuilding {
    pub building_id: String,
    pub point: Option<(f64, f64)>,
    pub polygon: Option<Vec<Ring>>,
}

impl SpatialBuilding {
    /// The representative point for distance queries: the explicit point if
    /// present, else the polygon centroid.
    pub fn locate(&self) -> Option<(f64, f64)> {
        self.point.or_else(|| {
            self.polygon
                .as_ref()
                .and_then(|rings| rings.first())
                .and_then(|ring| crate::predicates::centroid(ring))
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BuildingRef {
    pub building_id: String,
    pub lon: f64,
    pub lat: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlapStats {
    pub intersection_m2: f64,
    pub union_m2: f64,
    pub a_m2: f64,
    pub b_m2: f64,
    pub overlap_pct: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeighborStats {
    pub avg: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub clustering_index: f64,
}

/// The contract both backends (indexed and scan) satisfy (spec.md §4.2).
pub trait SpatialQuery {
    fn buildings_in_bbox(
        &self,
        min_lng: f64,
        min_lat: f64,
        max_lng: f64,
        max_lat: f64,
        limit: usize,
    ) -> Vec<BuildingRef>;

    fn buildings_in_polygon(&self, polygon: &[Ring], limit: usize) -> Vec<BuildingRef>;

    /// Sorted by ascending distance, then building ID ascending.
    fn buildings_in_radius(
        &self,
        center: (f64, f64),
        radius_m: f64,
        limit: usize,
    ) -> Vec<(BuildingRef, f64)>;

    /// KNN by great-circle distance, sorted ascending then building ID ascending.
    fn nearest_k(&self, center: (f64, f64), k: usize) -> Vec<(BuildingRef, f64)>;

    fn overlap(&self, a_polygon: &[Ring], b_polygon: &[Ring]) -> OverlapStats;

    fn nearest_neighbor_stats(&self, sample_n: usize) -> NeighborStats;

    fn batch_membership(
        &self,
        polygons: &[Vec<Ring>],
        building_ids: Option<&[String]>,
    ) -> HashMap<usize, Vec<String>>;
}

/// Scan backend: pre-filters by a lat/lng bounding box derived from the
/// query (1 deg lat ~= 111km, 1 deg lng ~= 111km * cos(lat) at query
/// latitude), then applies the exact predicate from `trr_spatial::predicates`.
pub struct ScanBackend {
    buildings: Vec<SpatialBuilding>,
}

const METERS_PER_DEG_LAT: f64 = 111_000.0;

impl ScanBackend {
    pub fn new(buildings: Vec<SpatialBuilding>) -> Self {
        Self { buildings }
    }

    fn located(&self) -> impl Iterator<Item = (&SpatialBuilding, (f64, f64))> {
        self.buildings.iter().filter_map(|b| b.locate().map(|p| (b, p)))
    }

    fn meters_per_deg_lng(lat: f64) -> f64 {
        METERS_PER_DEG_LAT * lat.to_radians().cos().abs().max(1e-9)
    }

    fn sort_by_distance_then_id(mut v: Vec<(BuildingRef, f64)>) -> Vec<(BuildingRef, f64)> {
        v.sort_by(|(a_ref, a_dist), (b_ref, b_dist)| {
            a_dist
                .partial_cmp(b_dist)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a_ref.building_id.cmp(&b_ref.building_id))
        });
        v
    }
}

impl SpatialQuery for ScanBackend {
    fn buildings_in_bbox(
        &self,
        min_lng: f64,
        min_lat: f64,
        max_lng: f64,
        max_lat: f64,
        limit: usize,
    ) -> Vec<BuildingRef> {
        self.located()
            .filter(|(_, (lon, lat))| *lon >= min_lng && *lon <= max_lng && *lat >= min_lat && *lat <= max_lat)
            .take(limit.max(1))
            .map(|(b, (lon, lat))| BuildingRef {
                building_id: b.building_id.clone(),
                lon,
                lat,
            })
            .collect()
    }

    fn buildings_in_polygon(&self, polygon: &[Ring], limit: usize) -> Vec<BuildingRef> {
        if polygon.first().map(|r| r.len()).unwrap_or(0) < 3 {
            return Vec::new();
        }
        self.located()
            .filter(|(_, p)| point_in_polygon(*p, polygon))
            .take(limit.max(1))
            .map(|(b, (lon, lat))| BuildingRef {
                building_id: b.building_id.clone(),
                lon,
                lat,
            })
            .collect()
    }

    fn buildings_in_radius(
        &self,
        center: (f64, f64),
        radius_m: f64,
        limit: usize,
    ) -> Vec<(BuildingRef, f64)> {
        if radius_m <= 0.0 {
            return Vec::new();
        }
        let (clon, clat) = center;
        let dlat = radius_m / METERS_PER_DEG_LAT;
        let dlng = radius_m / Self::meters_per_deg_lng(clat);
        let (min_lng, max_lng) = (clon - dlng, clon + dlng);
        let (min_lat, max_lat) = (clat - dlat, clat + dlat);

        let candidates: Vec<(BuildingRef, f64)> = self
            .located()
            .filter(|(_, (lon, lat))| *lon >= min_lng && *lon <= max_lng && *lat >= min_lat && *lat <= max_lat)
            .filter_map(|(b, p)| {
                let dist = haversine(center, p);
                if dist > radius_m {
                    None
                } else {
                    Some((
                        BuildingRef {
                            building_id: b.building_id.clone(),
                            lon: p.0,
                            lat: p.1,
                        },
                        dist,
                    ))
                }
            })
            .collect();

        let mut sorted = Self::sort_by_distance_then_id(candidates);
        sorted.truncate(limit.max(1));
        sorted
    }

    fn nearest_k(&self, center: (f64, f64), k: usize) -> Vec<(BuildingRef, f64)> {
        let candidates: Vec<(BuildingRef, f64)> = self
            .located()
            .map(|(b, p)| {
                (
                    BuildingRef {
                        building_id: b.building_id.clone(),
                        lon: p.0,
                        lat: p.1,
                    },
                    haversine(center, p),
                )
            })
            .collect();
        let mut sorted = Self::sort_by_distance_then_id(candidates);
        sorted.truncate(k);
        sorted
    }

    fn overlap(&self, a_polygon: &[Ring], b_polygon: &[Ring]) -> OverlapStats {
        let a_m2 = a_polygon.first().map(polygon_area).unwrap_or(0.0);
        let b_m2 = b_polygon.first().map(polygon_area).unwrap_or(0.0);

        // No true polygon intersection (spec.md Non-goals): approximate
        // intersection by sampling the smaller polygon's vertices for
        // membership in the other and scaling its area by the membership
        // fraction. Documented as an approximation, not exact geometry.
        let intersection_m2 = approximate_intersection_area(a_polygon, b_polygon, a_m2, b_m2);
        let union_m2 = (a_m2 + b_m2 - intersection_m2).max(0.0);
        let overlap_pct = if union_m2 > 0.0 {
            intersection_m2 / union_m2 * 100.0
        } else {
            0.0
        };

        OverlapStats {
            intersection_m2,
            union_m2,
            a_m2,
            b_m2,
            overlap_pct,
        }
    }

    fn nearest_neighbor_stats(&self, sample_n: usize) -> NeighborStats {
        let located: Vec<(f64, f64)> = self.located().map(|(_, p)| p).collect();
        if located.len() < 2 {
            return NeighborStats {
                avg: 0.0,
                median: 0.0,
                min: 0.0,
                max: 0.0,
                clustering_index: 0.0,
            };
        }
        let sample_n = sample_n.min(located.len()).max(1);
        let mut dists: Vec<f64> = located
            .iter()
            .take(sample_n)
            .map(|&p| {
                located
                    .iter()
                    .filter(|&&q| q != p)
                    .map(|&q| haversine(p, q))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        dists.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let n = dists.len() as f64;
        let avg = dists.iter().sum::<f64>() / n;
        let median = if dists.len() % 2 == 0 {
            let mid = dists.len() / 2;
            (dists[mid - 1] + dists[mid]) / 2.0
        } else {
            dists[dists.len() / 2]
        };
        let min = *dists.first().unwrap();
        let max = *dists.last().unwrap();
        let clustering_index = if avg > 0.0 { median / avg } else { 0.0 };

        NeighborStats {
            avg,
            median,
            min,
            max,
            clustering_index,
        }
    }

    fn batch_membership(
        &self,
        polygons: &[Vec<Ring>],
        building_ids: Option<&[String]>,
    ) -> HashMap<usize, Vec<String>> {
        let scope: Vec<&SpatialBuilding> = match building_ids {
            Some(ids) => self
                .buildings
                .iter()
                .filter(|b| ids.contains(&b.building_id))
                .collect(),
            None => self.buildings.iter().collect(),
        };

        let mut out = HashMap::new();
        for (i, polygon) in polygons.iter().enumerate() {
            let mut ids = Vec::new();
            for b in &scope {
                if let Some(p) = b.locate() {
                    if point_in_polygon(p, polygon) {
                        ids.push(b.building_id.clone());
                    }
                }
            }
            out.insert(i, ids);
        }
        out
    }
}

fn approximate_intersection_area(a: &[Ring], b: &[Ring], a_m2: f64, b_m2: f64) -> f64 {
    let (Some(a_ext), Some(b_ext)) = (a.first(), b.first()) else {
        return 0.0;
    };
    if a_ext.len() < 3 || b_ext.len() < 3 {
        return 0.0;
    }
    let samples = 16usize;
    let a_in_b = sample_membership_fraction(a_ext, b, samples);
    let b_in_a = sample_membership_fraction(b_ext, a, samples);
    // Average the two directional membership fractions against the smaller
    // polygon's area — a symmetric approximation, not true geometric
    // intersection (spec.md Non-goals rule out exact polygon intersection).
    let fraction = (a_in_b + b_in_a) / 2.0;
    a_m2.min(b_m2) * fraction
}

fn sample_membership_fraction(ring: &Ring, other: &[Ring], samples: usize) -> f64 {
    if ring.is_empty() {
        return 0.0;
    }
    let step = (ring.len().max(1) + samples - 1) / samples.max(1);
    let step = step.max(1);
    let mut hits = 0usize;
    let mut total = 0usize;
    for (i, &p) in ring.iter().enumerate() {
        if i % step != 0 {
            continue;
        }
        total += 1;
        if point_in_polygon(p, other) {
            hits += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}
