//! Named region polygons and per-region intensity maxima.
//!
//! Regions are immutable polygons loaded once. The station-to-region
//! assignment is computed a single time by ray casting and cached; the
//! cache is bound to the geometry and survives scenario resets. Per-tick
//! aggregation is then a linear scan over stations.

use std::collections::BTreeMap;

use crate::stations::Station;

/// A named polygon (possibly multi-polygon) with a code.
#[derive(Debug, Clone)]
pub struct Region {
    pub code: String,
    pub name: String,
    /// Outer rings as (lat, lon) vertex lists.
    rings: Vec<Vec<(f64, f64)>>,
}

impl Region {
    #[must_use]
    pub fn new(code: String, name: String, rings: Vec<Vec<(f64, f64)>>) -> Self {
        Self { code, name, rings }
    }

    /// Point-in-polygon over any outer ring.
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.rings.iter().any(|ring| point_in_ring(lat, lon, ring))
    }
}

/// Ray-casting point-in-polygon test against one ring.
fn point_in_ring(lat: f64, lon: f64, ring: &[(f64, f64)]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let (mut p1_lat, mut p1_lon) = ring[0];
    for i in 1..=n {
        let (p2_lat, p2_lon) = ring[i % n];
        if lat > p1_lat.min(p2_lat)
            && lat <= p1_lat.max(p2_lat)
            && lon <= p1_lon.max(p2_lon)
            && (p1_lat - p2_lat).abs() > f64::EPSILON
        {
            let x_intersect = (lat - p1_lat) * (p2_lon - p1_lon) / (p2_lat - p1_lat) + p1_lon;
            if (p1_lon - p2_lon).abs() < f64::EPSILON || lon <= x_intersect {
                inside = !inside;
            }
        }
        (p1_lat, p1_lon) = (p2_lat, p2_lon);
    }
    inside
}

/// Aggregated intensity picture across regions for one tick.
#[derive(Debug, Clone, Default)]
pub struct RegionMax {
    /// region code -> strongest station intensity inside it
    pub by_code: BTreeMap<String, f64>,
    pub overall_max: f64,
    pub overall_max_region: String,
}

/// Region geometry plus the one-shot station assignment cache.
#[derive(Debug, Clone)]
pub struct RegionIndex {
    regions: Vec<Region>,
    station_cache: Option<Vec<Option<usize>>>,
}

impl RegionIndex {
    #[must_use]
    pub fn new(regions: Vec<Region>) -> Self {
        Self {
            regions,
            station_cache: None,
        }
    }

    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Assign every station to its region. Runs the quadratic ray-casting
    /// pass only once; subsequent calls are no-ops.
    pub fn ensure_cache(&mut self, stations: &[Station]) {
        if self.station_cache.is_some() {
            return;
        }
        tracing::debug!(stations = stations.len(), "building station-region cache");
        let cache = stations
            .iter()
            .map(|station| {
                self.regions
                    .iter()
                    .position(|region| region.contains(station.info.lat, station.info.lon))
            })
            .collect();
        self.station_cache = Some(cache);
    }

    /// Rebuild the per-region maxima from the current station intensities.
    /// Builds the assignment cache on first use.
    pub fn aggregate(&mut self, stations: &[Station]) -> RegionMax {
        self.ensure_cache(stations);
        let mut result = RegionMax::default();
        let Some(cache) = &self.station_cache else {
            return result;
        };

        for (station, region_idx) in stations.iter().zip(cache.iter()) {
            if station.intensity < 0.5 {
                continue;
            }
            let Some(region_idx) = region_idx else {
                continue;
            };
            let region = &self.regions[*region_idx];
            let entry = result.by_code.entry(region.code.clone()).or_insert(f64::MIN);
            *entry = entry.max(station.intensity);
            if station.intensity > result.overall_max {
                result.overall_max = station.intensity;
                result.overall_max_region = region.name.clone();
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stations::{StationInfo, StationSet};

    fn square(code: &str, name: &str, lat0: f64, lon0: f64) -> Region {
        Region::new(
            code.to_string(),
            name.to_string(),
            vec![vec![
                (lat0, lon0),
                (lat0 + 1.0, lon0),
                (lat0 + 1.0, lon0 + 1.0),
                (lat0, lon0 + 1.0),
            ]],
        )
    }

    fn station(id: u32, lat: f64, lon: f64) -> StationInfo {
        StationInfo {
            id,
            lat,
            lon,
            name: String::new(),
            amp: 1.0,
        }
    }

    #[test]
    fn test_point_in_square() {
        let region = square("100", "Test", 35.0, 139.0);
        assert!(region.contains(35.5, 139.5));
        assert!(!region.contains(36.5, 139.5));
        assert!(!region.contains(35.5, 141.0));
    }

    #[test]
    fn test_multi_ring_region() {
        let region = Region::new(
            "200".to_string(),
            "Islands".to_string(),
            vec![
                vec![(30.0, 130.0), (31.0, 130.0), (31.0, 131.0), (30.0, 131.0)],
                vec![(33.0, 133.0), (34.0, 133.0), (34.0, 134.0), (33.0, 134.0)],
            ],
        );
        assert!(region.contains(30.5, 130.5));
        assert!(region.contains(33.5, 133.5));
        assert!(!region.contains(32.0, 132.0));
    }

    #[test]
    fn test_aggregate_takes_per_region_max() {
        let mut index = RegionIndex::new(vec![
            square("100", "North", 36.0, 139.0),
            square("200", "South", 34.0, 139.0),
        ]);
        let mut set = StationSet::new(vec![
            station(1, 36.2, 139.5),
            station(2, 36.8, 139.5),
            station(3, 34.5, 139.5),
            station(4, 20.0, 100.0), // outside all regions
        ]);
        // hand-set intensities; aggregation only reads them
        let intensities = [4.0, 5.2, 2.0, 6.9];
        for (station, value) in set_stations_mut(&mut set).iter_mut().zip(intensities) {
            station.intensity = value;
        }

        let max = index.aggregate(set.stations());
        assert!((max.by_code["100"] - 5.2).abs() < 1e-12);
        assert!((max.by_code["200"] - 2.0).abs() < 1e-12);
        assert!((max.overall_max - 5.2).abs() < 1e-12);
        assert_eq!(max.overall_max_region, "North");
    }

    #[test]
    fn test_substation_threshold_excluded() {
        let mut index = RegionIndex::new(vec![square("100", "North", 36.0, 139.0)]);
        let mut set = StationSet::new(vec![station(1, 36.5, 139.5)]);
        set_stations_mut(&mut set)[0].intensity = 0.3;
        let max = index.aggregate(set.stations());
        assert!(max.by_code.is_empty());
        assert!((max.overall_max - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_cache_built_once() {
        let mut index = RegionIndex::new(vec![square("100", "North", 36.0, 139.0)]);
        let set = StationSet::new(vec![station(1, 36.5, 139.5)]);
        index.ensure_cache(set.stations());
        let first = index.station_cache.clone();
        index.ensure_cache(set.stations());
        assert_eq!(index.station_cache, first);
        assert_eq!(first, Some(vec![Some(0)]));
    }

    #[test]
    fn test_empty_regions_yield_empty_picture() {
        let mut index = RegionIndex::new(vec![]);
        let set = StationSet::new(vec![station(1, 36.5, 139.5)]);
        let max = index.aggregate(set.stations());
        assert!(max.by_code.is_empty());
        assert!(max.overall_max_region.is_empty());
    }

    /// Test-only access to mutate station state directly.
    fn set_stations_mut(set: &mut StationSet) -> &mut [Station] {
        set.stations_mut()
    }
}
