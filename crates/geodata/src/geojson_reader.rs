//! GeoJSON point features → [`FeatureRecord`]s.

use crate::{lonlat_to_mercator, Attributes, DataError, FeatureRecord, Result};
use geojson::{feature::Id, Feature, GeoJson, Value};
use serde_json::Value as JsonValue;
use std::path::Path;

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<FeatureRecord>> {
    let text = std::fs::read_to_string(path)?;
    parse_str(&text)
}

/// Parses a `FeatureCollection` or a single `Feature`. Non-point geometry is
/// kept as a record without geometry.
pub fn parse_str(text: &str) -> Result<Vec<FeatureRecord>> {
    let features = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => return Err(DataError::UnsupportedRoot),
    };

    let mut without_geometry = 0usize;
    let records: Vec<FeatureRecord> = features
        .into_iter()
        .map(|feature| {
            let record = to_record(feature);
            if record.geometry.is_none() {
                without_geometry += 1;
            }
            record
        })
        .collect();

    if without_geometry > 0 {
        log::warn!(
            "GeoJSON: {} of {} feature(s) carry no point geometry",
            without_geometry,
            records.len()
        );
    }

    Ok(records)
}

fn to_record(feature: Feature) -> FeatureRecord {
    let geometry = feature.geometry.as_ref().and_then(|g| match &g.value {
        Value::Point(position) if position.len() >= 2 => {
            let lonlat = [position[0], position[1]];
            (lonlat[0].is_finite() && lonlat[1].is_finite()).then(|| lonlat_to_mercator(lonlat))
        }
        _ => {
            log::debug!("GeoJSON: non-point geometry ignored");
            None
        }
    });

    let id = feature.id.map(|id| match id {
        Id::String(s) => s,
        Id::Number(n) => n.to_string(),
    });

    let mut attributes = Attributes::new();
    if let Some(properties) = feature.properties {
        for (key, value) in properties {
            attributes.insert(key, property_text(value));
        }
    }

    FeatureRecord {
        id: id.filter(|id| !id.is_empty()),
        geometry,
        attributes,
    }
}

fn property_text(value: JsonValue) -> String {
    match value {
        JsonValue::String(s) => s,
        JsonValue::Null => String::new(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}
