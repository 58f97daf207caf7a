//! Layer descriptions and their in-memory feature sets.

use crate::config::ConfigError;
use crate::filter::FieldPolicy;
use crate::style::StylingPolicy;
use geodata::{backfill_ids, FeatureRecord};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Where a layer's features come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum SourceSpec {
    Geojson {
        path: PathBuf,
    },
    Csv {
        path: PathBuf,
        /// Column mirrored into the `name` attribute.
        #[serde(default)]
        name_column: Option<String>,
    },
}

/// Static configuration of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub id: String,
    pub title: String,
    pub source: SourceSpec,
    /// Initial camera centre when the layer is selected, `[lon, lat]` degrees.
    pub center: [f64; 2],
    pub zoom: f64,
    pub search_fields: FieldPolicy,
    /// Attribute name → table header.
    #[serde(default)]
    pub column_labels: IndexMap<String, String>,
    /// Attributes never shown as table columns.
    #[serde(default)]
    pub hidden_columns: Vec<String>,
    pub styling: StylingPolicy,
}

impl LayerSpec {
    pub fn column_label<'a>(&'a self, attribute: &'a str) -> &'a str {
        self.column_labels
            .get(attribute)
            .map(String::as_str)
            .unwrap_or(attribute)
    }
}

/// The ordered features of one layer, addressable by id.
#[derive(Debug, Default)]
pub struct LayerDataset {
    features: Vec<FeatureRecord>,
    index: HashMap<String, usize>,
    generation: u64,
}

impl LayerDataset {
    #[inline]
    pub fn features(&self) -> &[FeatureRecord] {
        &self.features
    }

    pub fn get(&self, id: &str) -> Option<&FeatureRecord> {
        self.index.get(id).map(|&idx| &self.features[idx])
    }

    /// Bulk replace. Identifiers are back-filled so every record is addressable.
    pub fn replace_all(&mut self, layer_id: &str, mut records: Vec<FeatureRecord>) {
        let assigned = backfill_ids(&mut records, layer_id);
        if assigned > 0 {
            log::debug!("Layer '{}': back-filled {} feature id(s)", layer_id, assigned);
        }

        self.index = records
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.id().to_string(), idx))
            .collect();
        self.features = records;
        self.generation += 1;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Bumped on every bulk replace.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
pub struct Layer {
    pub spec: LayerSpec,
    pub dataset: LayerDataset,
}

impl Layer {
    #[inline]
    pub fn id(&self) -> &str {
        &self.spec.id
    }
}

/// Every configured layer, in configuration order. Never empty.
#[derive(Debug)]
pub struct LayerRegistry {
    layers: Vec<Layer>,
}

impl LayerRegistry {
    pub fn new(specs: Vec<LayerSpec>) -> Result<Self, ConfigError> {
        crate::config::validate(&specs)?;

        Ok(Self {
            layers: specs
                .into_iter()
                .map(|spec| Layer {
                    spec,
                    dataset: LayerDataset::default(),
                })
                .collect(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id() == id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.id() == id)
    }

    /// The last configured layer.
    pub fn default_layer(&self) -> &Layer {
        // Non-empty by construction (validated in `new`).
        &self.layers[self.layers.len() - 1]
    }

    /// `id` when it names a configured layer, otherwise the default layer's id.
    pub fn resolve<'a>(&'a self, id: Option<&str>) -> &'a str {
        match id.and_then(|id| self.get(id)) {
            Some(layer) => layer.id(),
            None => {
                if let Some(unknown) = id {
                    log::warn!(
                        "Unknown layer '{}', falling back to '{}'",
                        unknown,
                        self.default_layer().id()
                    );
                }
                self.default_layer().id()
            }
        }
    }
}
