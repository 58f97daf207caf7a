//! Semicolon-delimited CSV → [`FeatureRecord`]s.

use crate::{lonlat_to_mercator, DataError, FeatureRecord, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::path::Path;

/// Column names the reader looks for.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub lon_column: String,
    pub lat_column: String,
    pub id_column: String,
    /// When set, this column's value is also stored under the `name` attribute.
    pub name_column: Option<String>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            lon_column: "lon".into(),
            lat_column: "lat".into(),
            id_column: "id".into(),
            name_column: None,
        }
    }
}

pub fn read_file<P: AsRef<Path>>(path: P, options: &CsvOptions) -> Result<Vec<FeatureRecord>> {
    let text = std::fs::read_to_string(path)?;
    parse_str(&text, options)
}

/// Parses CSV text. Malformed rows are skipped, never fatal.
pub fn parse_str(text: &str, options: &CsvOptions) -> Result<Vec<FeatureRecord>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .quoting(false)
        .flexible(true)
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(text.trim().as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let column = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    };
    let lon_idx = column(&options.lon_column)?;
    let lat_idx = column(&options.lat_column)?;
    let id_idx = headers.iter().position(|h| *h == options.id_column);

    let mut out = Vec::new();
    let mut skipped = 0usize;

    for (line, row) in reader.records().enumerate() {
        let row: StringRecord = match row {
            Ok(row) => row,
            Err(err) => {
                log::debug!("CSV row {}: unreadable ({}), skipped", line + 1, err);
                skipped += 1;
                continue;
            }
        };

        if row.len() != headers.len() {
            log::debug!(
                "CSV row {}: {} cells, header has {}; skipped",
                line + 1,
                row.len(),
                headers.len()
            );
            skipped += 1;
            continue;
        }

        let (Some(lon), Some(lat)) = (parse_coord(&row[lon_idx]), parse_coord(&row[lat_idx])) else {
            log::debug!("CSV row {}: non-numeric lon/lat, skipped", line + 1);
            skipped += 1;
            continue;
        };

        let mut record = FeatureRecord::new(Some(lonlat_to_mercator([lon, lat])));

        if let Some(name_column) = options.name_column.as_deref() {
            if let Some(idx) = headers.iter().position(|h| h == name_column) {
                record.attributes.insert("name".into(), row[idx].to_string());
            }
        }
        for (header, cell) in headers.iter().zip(row.iter()) {
            record.attributes.insert(header.clone(), cell.to_string());
        }

        let provided = id_idx.map(|idx| &row[idx]).filter(|id| !id.is_empty());
        record.id = Some(match provided {
            Some(id) => id.to_string(),
            None => format!("{lat},{lon}"),
        });

        out.push(record);
    }

    if skipped > 0 {
        log::warn!("CSV: skipped {} malformed row(s), kept {}", skipped, out.len());
    }

    Ok(out)
}

#[inline]
fn parse_coord(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}
