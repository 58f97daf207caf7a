use crate::data::types::{LayerSpec, SourceSpec};
use crate::filter::FieldPolicy;
use crate::style::{Icon, StylingPolicy, DEFAULT_CLUSTER_DISTANCE_PX};
use clap::Parser;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// `map-viewer` - An interactive point-layer map viewer.
///
/// Shows one of several configured layers on a slippy map, with a live text
/// filter, a synchronized feature table and an automatic presentation tour.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// JSON file describing the layers to show.
    ///
    /// When omitted, the built-in Washington, Moscow and Kaluga layers are used.
    #[arg(long, env = "MAP_VIEWER_LAYERS")]
    pub layers: Option<PathBuf>,

    /// Directory that relative layer source paths are resolved against.
    #[arg(long, env = "MAP_VIEWER_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// File holding the persisted view state (camera, layer, table, filter).
    #[arg(long, env = "MAP_VIEWER_STATE_FILE", default_value = "map_viewer_state.json")]
    pub state_file: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read layer configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid layer configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no layers configured")]
    NoLayers,

    #[error("layer id '{0}' is configured more than once")]
    DuplicateLayer(String),

    #[error("layer '{0}' has no search fields")]
    NoSearchFields(String),
}

/// Reads the layer list from `path`, or returns [`default_layers`].
pub fn load_layers(path: Option<&Path>) -> Result<Vec<LayerSpec>, ConfigError> {
    let layers = match path {
        Some(path) => {
            log::info!("Reading layer configuration from {}", path.display());
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text)?
        }
        None => default_layers(),
    };

    validate(&layers)?;
    Ok(layers)
}

pub fn validate(layers: &[LayerSpec]) -> Result<(), ConfigError> {
    if layers.is_empty() {
        return Err(ConfigError::NoLayers);
    }

    let mut ids = HashSet::new();
    for layer in layers {
        if !ids.insert(layer.id.as_str()) {
            return Err(ConfigError::DuplicateLayer(layer.id.clone()));
        }
        if layer.search_fields.is_empty() {
            return Err(ConfigError::NoSearchFields(layer.id.clone()));
        }
    }

    Ok(())
}

/// Washington (GeoJSON, clustered), Moscow (CSV, clustered, bilingual names)
/// and Kaluga (GeoJSON, icons by object group). Kaluga is the default layer.
pub fn default_layers() -> Vec<LayerSpec> {
    let clustered = StylingPolicy::Clustered {
        icon: Icon::Marker,
        distance_px: DEFAULT_CLUSTER_DISTANCE_PX,
    };

    vec![
        LayerSpec {
            id: "layer1".into(),
            title: "Вашингтон".into(),
            source: SourceSpec::Geojson {
                path: "my.geojson".into(),
            },
            center: [-77.03195, 38.907826],
            zoom: 11.0,
            search_fields: FieldPolicy::new(["name"]),
            column_labels: labels(&[("name", "Name"), ("description", "Description")]),
            hidden_columns: Vec::new(),
            styling: clustered.clone(),
        },
        LayerSpec {
            id: "layer2".into(),
            title: "Москва".into(),
            source: SourceSpec::Csv {
                path: "my.csv".into(),
                name_column: Some("Название_ru".into()),
            },
            center: [37.6173, 55.7558],
            zoom: 10.0,
            search_fields: FieldPolicy::new(["Название_ru", "Name_en"]),
            column_labels: labels(&[
                ("Название_ru", "Название"),
                ("Name_en", "Name"),
                ("description", "Описание"),
                ("lon", "Долгота"),
                ("lat", "Широта"),
            ]),
            hidden_columns: vec!["name".into()],
            styling: clustered,
        },
        LayerSpec {
            id: "layer3".into(),
            title: "Калуга".into(),
            source: SourceSpec::Geojson {
                path: "kaluga.geojson".into(),
            },
            center: [36.3, 54.5],
            zoom: 10.0,
            search_fields: FieldPolicy::new(["name"]),
            column_labels: labels(&[
                ("name", "Название"),
                ("group_obj", "Группа"),
                ("description", "Описание"),
            ]),
            hidden_columns: Vec::new(),
            styling: StylingPolicy::Categorical {
                attribute: "group_obj".into(),
                categories: IndexMap::from([
                    ("Ландшафтные объекты".to_string(), Icon::Landscape),
                    ("Водные объекты".to_string(), Icon::Water),
                    ("Историко-культурные объекты".to_string(), Icon::Heritage),
                    ("Лесные массивы".to_string(), Icon::Forest),
                ]),
                default_icon: Icon::Other,
            },
        },
    ]
}

fn labels(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_end_with_kaluga() {
        let layers = default_layers();
        validate(&layers).unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[2].id, "layer3");
        assert_eq!(layers[1].search_fields.fields(), ["Название_ru", "Name_en"]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut layers = default_layers();
        layers[1].id = "layer1".into();
        assert!(matches!(validate(&layers), Err(ConfigError::DuplicateLayer(id)) if id == "layer1"));
    }

    #[test]
    fn empty_search_fields_are_rejected() {
        let mut layers = default_layers();
        layers[0].search_fields = FieldPolicy::new(Vec::<String>::new());
        assert!(matches!(validate(&layers), Err(ConfigError::NoSearchFields(_))));
    }

    #[test]
    fn reads_layers_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layers.json");
        std::fs::write(
            &path,
            r#"[{
                "id": "parks",
                "title": "Parks",
                "source": { "format": "csv", "path": "parks.csv" },
                "center": [30.3, 59.9],
                "zoom": 12,
                "search_fields": ["name"],
                "styling": { "kind": "plain", "icon": "forest" }
            }]"#,
        )
        .unwrap();

        let layers = load_layers(Some(&path)).unwrap();
        assert_eq!(layers[0].id, "parks");
        assert_eq!(
            layers[0].source,
            SourceSpec::Csv {
                path: "parks.csv".into(),
                name_column: None
            }
        );
        assert!(layers[0].hidden_columns.is_empty());
    }

    #[test]
    fn empty_json_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layers.json");
        std::fs::write(&path, "[]").unwrap();
        assert!(matches!(load_layers(Some(&path)), Err(ConfigError::NoLayers)));
    }

    #[test]
    fn cli_defaults() {
        let config = Config::parse_from(["map-viewer"]);
        assert!(config.layers.is_none());
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.state_file, PathBuf::from("map_viewer_state.json"));
    }
}
