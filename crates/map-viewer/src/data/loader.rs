use crate::data::types::{LayerSpec, SourceSpec};
use crossbeam_channel::Sender;
use geodata::{csv_reader, geojson_reader, CsvOptions, DataError, FeatureRecord};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::thread;

/// Outcome of one layer load, delivered to the UI thread.
#[derive(Debug)]
pub enum LoadEvent {
    Loaded {
        layer_id: String,
        records: Vec<FeatureRecord>,
    },
    Failed {
        layer_id: String,
        error: DataError,
    },
}

impl LoadEvent {
    pub fn layer_id(&self) -> &str {
        match self {
            LoadEvent::Loaded { layer_id, .. } | LoadEvent::Failed { layer_id, .. } => layer_id,
        }
    }
}

/// Reads and parses one layer source. Relative paths resolve against `data_dir`.
pub fn load_source(source: &SourceSpec, data_dir: &Path) -> Result<Vec<FeatureRecord>, DataError> {
    match source {
        SourceSpec::Geojson { path } => geojson_reader::read_file(data_dir.join(path)),
        SourceSpec::Csv { path, name_column } => {
            let options = CsvOptions {
                name_column: name_column.clone(),
                ..CsvOptions::default()
            };
            csv_reader::read_file(data_dir.join(path), &options)
        }
    }
}

/// Loads every layer on a background thread, parsing sources in parallel.
/// One event per layer is sent, in completion order.
pub fn spawn_loads(
    specs: Vec<LayerSpec>,
    data_dir: PathBuf,
    tx: Sender<LoadEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        specs.par_iter().for_each(|spec| {
            let event = match load_source(&spec.source, &data_dir) {
                Ok(records) => {
                    log::info!("Loaded layer '{}': {} feature(s)", spec.id, records.len());
                    LoadEvent::Loaded {
                        layer_id: spec.id.clone(),
                        records,
                    }
                }
                Err(error) => {
                    log::warn!("Failed to load layer '{}': {}", spec.id, error);
                    LoadEvent::Failed {
                        layer_id: spec.id.clone(),
                        error,
                    }
                }
            };

            // The receiver is gone once the window has closed.
            if tx.send(event).is_err() {
                log::debug!("Load result for '{}' dropped, receiver closed", spec.id);
            }
        });
    })
}
