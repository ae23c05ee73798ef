//! Data models for loaded inputs.
//!
//! Collaborators hand the engine a station list (JSON array) and a region
//! set (GeoJSON-style FeatureCollection of Polygon/MultiPolygon features).
//! These structures match those wire shapes and convert into the engine's
//! own types. GeoJSON stores coordinates lon-first; the engine is lat-first.

use serde::Deserialize;

use crate::regions::Region;
use crate::stations::StationInfo;

fn default_amp() -> f64 {
    1.0
}

/// One observation station record.
#[derive(Debug, Clone, Deserialize)]
pub struct StationRecord {
    /// Stable station ID
    pub id: u32,

    /// Latitude (degrees)
    pub lat: f64,

    /// Longitude (degrees)
    pub lon: f64,

    /// Display name; empty when the feed omits it
    #[serde(default)]
    pub name: String,

    /// Site amplification factor, 1.0 for average ground
    #[serde(default = "default_amp")]
    pub amp: f64,
}

impl StationRecord {
    /// Validate the record's ranges.
    pub fn validate(&self) -> Result<(), String> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(format!("station {}: lat {} out of range", self.id, self.lat));
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(format!("station {}: lon {} out of range", self.id, self.lon));
        }
        if !self.amp.is_finite() {
            return Err(format!("station {}: non-finite amp", self.id));
        }
        Ok(())
    }
}

impl From<&StationRecord> for StationInfo {
    fn from(record: &StationRecord) -> Self {
        Self {
            id: record.id,
            lat: record.lat,
            lon: record.lon,
            name: if record.name.is_empty() {
                format!("Station_{}", record.id)
            } else {
                record.name.clone()
            },
            amp: record.amp,
        }
    }
}

/// Convert a full station list.
#[must_use]
pub fn stations_from_records(records: &[StationRecord]) -> Vec<StationInfo> {
    records.iter().map(StationInfo::from).collect()
}

/// Top-level GeoJSON region collection.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionCollection {
    /// Always "FeatureCollection"
    #[serde(rename = "type")]
    pub type_: String,

    /// Region polygons
    pub features: Vec<RegionFeature>,
}

impl RegionCollection {
    /// Validate the collection structure.
    pub fn validate(&self) -> Result<(), String> {
        if self.type_ != "FeatureCollection" {
            return Err(format!(
                "expected type 'FeatureCollection', got '{}'",
                self.type_
            ));
        }
        for feature in &self.features {
            feature.validate()?;
        }
        Ok(())
    }

    /// Convert every feature into an engine region.
    #[must_use]
    pub fn to_regions(&self) -> Vec<Region> {
        self.features.iter().map(RegionFeature::to_region).collect()
    }
}

/// One region feature.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionFeature {
    /// Always "Feature"
    #[serde(rename = "type")]
    pub type_: String,

    pub properties: RegionProperties,
    pub geometry: RegionGeometry,
}

impl RegionFeature {
    /// Validate the feature structure.
    pub fn validate(&self) -> Result<(), String> {
        if self.properties.code.is_empty() {
            return Err("region feature with empty code".to_string());
        }
        let empty_ring = match &self.geometry {
            RegionGeometry::Polygon { coordinates } => coordinates.iter().any(Vec::is_empty),
            RegionGeometry::MultiPolygon { coordinates } => coordinates
                .iter()
                .any(|poly| poly.iter().any(Vec::is_empty)),
        };
        if empty_ring {
            return Err(format!("region {}: empty ring", self.properties.code));
        }
        Ok(())
    }

    /// Build the engine region from the outer ring(s), flipping lon/lat.
    #[must_use]
    pub fn to_region(&self) -> Region {
        let flip = |ring: &[[f64; 2]]| -> Vec<(f64, f64)> {
            ring.iter().map(|&[lon, lat]| (lat, lon)).collect()
        };
        let rings = match &self.geometry {
            RegionGeometry::Polygon { coordinates } => {
                coordinates.first().map(|outer| flip(outer)).into_iter().collect()
            }
            RegionGeometry::MultiPolygon { coordinates } => coordinates
                .iter()
                .filter_map(|poly| poly.first().map(|outer| flip(outer)))
                .collect(),
        };
        Region::new(
            self.properties.code.clone(),
            self.properties.name.clone(),
            rings,
        )
    }
}

/// Region attributes.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionProperties {
    /// JMA area code
    pub code: String,

    /// Human-readable region name
    #[serde(default)]
    pub name: String,
}

/// Region geometry; only the outer ring of each polygon is used.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum RegionGeometry {
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<[f64; 2]>>> },
}
