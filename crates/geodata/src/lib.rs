//! geodata: point feature records for map layers.
//!
//! - Every record carries an optional identifier, an optional point geometry in
//!   Web-Mercator metres (EPSG:3857) and an ordered map of string attributes.
//! - Two sources are understood:
//!   - semicolon-delimited CSV with `lon` / `lat` columns (degrees, CRS:84),
//!   - GeoJSON `FeatureCollection` (or a lone `Feature`) with point geometry.
//! - Records missing an identifier are back-filled per layer with
//!   `<layer>-feature-<n>`, `n` counting back-filled records in load order.
//!
//! CSV layout:
//!   line 0      : header, `;` separated, cells trimmed
//!   line 1..N   : data rows, `;` separated, cells trimmed
//!                 rows whose cell count differs from the header are skipped
//!                 rows whose lon/lat do not parse as finite numbers are skipped
//!
//! Identifier order of preference: provided id, coordinate-derived
//! `"<lat>,<lon>"` (CSV only), synthetic back-fill.

use indexmap::IndexMap;
use std::collections::HashSet;

pub mod csv_reader;
pub mod geojson_reader;

pub use csv_reader::CsvOptions;

/// Attribute name → value, in source order.
pub type Attributes = IndexMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid GeoJSON: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv header lacks required column '{0}'")]
    MissingColumn(String),

    #[error("unsupported GeoJSON root, expected a Feature or FeatureCollection")]
    UnsupportedRoot,
}

impl From<geojson::Error> for DataError {
    fn from(err: geojson::Error) -> Self {
        DataError::GeoJson(Box::new(err))
    }
}

pub type Result<T, E = DataError> = std::result::Result<T, E>;

/// A single point feature as loaded from a layer source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureRecord {
    /// Unique within its layer once [`backfill_ids`] has run.
    pub id: Option<String>,
    /// Web-Mercator metres.
    pub geometry: Option<[f64; 2]>,
    pub attributes: Attributes,
}

impl FeatureRecord {
    pub fn new(geometry: Option<[f64; 2]>) -> Self {
        Self {
            id: None,
            geometry,
            attributes: Attributes::new(),
        }
    }

    /// Builder-style identifier setter.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// The identifier, or `""` before back-fill.
    #[inline]
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    /// Attribute value; a missing attribute reads as the empty string.
    #[inline]
    pub fn attribute(&self, name: &str) -> &str {
        self.attributes.get(name).map(String::as_str).unwrap_or("")
    }

    /// Geometry converted back to `[lon, lat]` degrees.
    pub fn lonlat(&self) -> Option<[f64; 2]> {
        self.geometry.map(mercator_to_lonlat)
    }
}

/// Assigns `<layer>-feature-<n>` to records without an identifier, or whose
/// identifier repeats one seen earlier in load order. Returns the number of
/// identifiers assigned.
pub fn backfill_ids(records: &mut [FeatureRecord], layer_id: &str) -> usize {
    let provided: HashSet<String> = records
        .iter()
        .filter_map(|r| r.id.clone())
        .filter(|id| !id.is_empty())
        .collect();

    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    let mut counter = 0usize;
    let mut assigned = 0usize;

    for record in records.iter_mut() {
        let keep = match record.id.as_deref() {
            Some(id) if !id.is_empty() => seen.insert(id.to_string()),
            _ => false,
        };
        if keep {
            continue;
        }

        // Skip candidates that collide with provided or already assigned ids.
        let synthetic = loop {
            let candidate = format!("{layer_id}-feature-{counter}");
            counter += 1;
            if !provided.contains(&candidate) && !seen.contains(&candidate) {
                break candidate;
            }
        };

        if let Some(old) = record.id.as_deref().filter(|id| !id.is_empty()) {
            log::warn!("Duplicate feature id '{old}' in layer '{layer_id}', reassigned '{synthetic}'");
        }

        seen.insert(synthetic.clone());
        record.id = Some(synthetic);
        assigned += 1;
    }

    assigned
}

pub mod mercator {
    /// Sphere radius used by EPSG:3857, in meters.
    pub const RADIUS: f64 = 6_378_137.0;

    /// Half the width of the projected world, in meters.
    pub const HALF_SIZE: f64 = std::f64::consts::PI * RADIUS;

    /// Ground resolution at zoom 0 for 256 px tiles, in meters per pixel.
    pub const RESOLUTION_Z0: f64 = 2.0 * HALF_SIZE / 256.0;
}

/// `[lon, lat]` degrees → Web-Mercator metres. Latitude is clamped to the
/// projection's square extent.
#[inline]
pub fn lonlat_to_mercator(lonlat: [f64; 2]) -> [f64; 2] {
    let [lon, lat] = lonlat;
    let x = mercator::RADIUS * lon.to_radians();
    let y = mercator::RADIUS
        * (std::f64::consts::PI * (lat + 90.0) / 360.0).tan().ln();

    [x, y.clamp(-mercator::HALF_SIZE, mercator::HALF_SIZE)]
}

/// Web-Mercator metres → `[lon, lat]` degrees.
#[inline]
pub fn mercator_to_lonlat(xy: [f64; 2]) -> [f64; 2] {
    let [x, y] = xy;
    let lon = (x / mercator::RADIUS).to_degrees();
    let lat = (2.0 * (y / mercator::RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();

    [lon, lat]
}

/// Formats `[lon, lat]` as `"<lon>, <lat>"` with a fixed number of decimals.
pub fn format_lonlat(lonlat: [f64; 2], decimals: usize) -> String {
    format!("{:.*}, {:.*}", decimals, lonlat[0], decimals, lonlat[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_roundtrips_within_tolerance() {
        let moscow = [37.6173, 55.7558];
        let back = mercator_to_lonlat(lonlat_to_mercator(moscow));
        assert!((back[0] - moscow[0]).abs() < 1e-9);
        assert!((back[1] - moscow[1]).abs() < 1e-9);
    }

    #[test]
    fn projection_origin_is_zero() {
        let [x, y] = lonlat_to_mercator([0.0, 0.0]);
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn poles_are_clamped() {
        let [_, y] = lonlat_to_mercator([0.0, 90.0]);
        assert_eq!(y, mercator::HALF_SIZE);
    }

    #[test]
    fn format_uses_fixed_decimals() {
        assert_eq!(format_lonlat([36.3, 54.5], 6), "36.300000, 54.500000");
    }

    #[test]
    fn backfill_assigns_sequential_ids_in_load_order() {
        let mut records = vec![FeatureRecord::new(None); 3];
        assert_eq!(backfill_ids(&mut records, "layer1"), 3);

        let ids: Vec<&str> = records.iter().map(FeatureRecord::id).collect();
        assert_eq!(ids, ["layer1-feature-0", "layer1-feature-1", "layer1-feature-2"]);
    }

    #[test]
    fn backfill_keeps_provided_ids_and_counts_only_missing() {
        let mut records = vec![
            FeatureRecord::new(None).with_id("a"),
            FeatureRecord::new(None),
            FeatureRecord::new(None).with_id("b"),
            FeatureRecord::new(None),
        ];
        assert_eq!(backfill_ids(&mut records, "l"), 2);

        let ids: Vec<&str> = records.iter().map(FeatureRecord::id).collect();
        assert_eq!(ids, ["a", "l-feature-0", "b", "l-feature-1"]);
    }

    #[test]
    fn backfill_replaces_duplicates_and_avoids_collisions() {
        let mut records = vec![
            FeatureRecord::new(None).with_id("l-feature-0"),
            FeatureRecord::new(None).with_id("x"),
            FeatureRecord::new(None).with_id("x"),
        ];
        backfill_ids(&mut records, "l");

        let ids: Vec<&str> = records.iter().map(FeatureRecord::id).collect();
        assert_eq!(ids, ["l-feature-0", "x", "l-feature-1"]);
    }

    #[test]
    fn missing_attribute_reads_empty() {
        let record = FeatureRecord::new(None).with_attribute("name", "Park");
        assert_eq!(record.attribute("name"), "Park");
        assert_eq!(record.attribute("description"), "");
    }
}
