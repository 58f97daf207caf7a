//! View synchronization.
//!
//! Every transition commits to [`ActiveViewState`] first, then recomputes the
//! map styles and the table rows from that one committed state within the same
//! call. No handler yields between the two, so the map and the table can never
//! disagree on the filter or the layer.

use crate::data::types::{Layer, LayerRegistry};
use crate::filter::Query;
use crate::state::{ActiveViewState, CameraView};
use crate::storage::KeyValueStore;
use crate::style::style_for;
use crate::surfaces::{
    CameraTarget, FitOptions, MapHit, PopupContent, StyledFeature, StyledLayer, TableColumn,
    TableRow, TableView, ViewSurfaces,
};
use crate::tour::TourSnapshot;
use geodata::{lonlat_to_mercator, mercator_to_lonlat, FeatureRecord};
use std::time::Duration;

pub const LAYER_SWITCH_DURATION: Duration = Duration::from_millis(1000);

/// Camera fit used when zooming to a feature from the table.
pub const FEATURE_FIT: FitOptions = FitOptions {
    padding_px: 50.0,
    max_zoom: 15.0,
    duration: Duration::from_millis(1000),
};

/// What the open popup is attached to, so it can be refreshed.
#[derive(Debug, Clone, PartialEq)]
enum PopupAnchor {
    Feature {
        layer_id: String,
        feature_id: String,
        force_coordinates: bool,
    },
    Coordinate([f64; 2]),
}

pub struct ViewSynchronizer<S: KeyValueStore> {
    layers: LayerRegistry,
    state: ActiveViewState,
    store: S,
    popup: Option<PopupAnchor>,
}

impl<S: KeyValueStore> ViewSynchronizer<S> {
    /// Restores the view state from `store`.
    pub fn new(layers: LayerRegistry, store: S) -> Self {
        let state = ActiveViewState::restore(&store, &layers);
        log::info!(
            "Restored view: layer '{}', filter {:?}, table {}",
            state.active_layer(),
            state.filter_text(),
            if state.table_visible() { "shown" } else { "hidden" }
        );

        Self {
            layers,
            state,
            store,
            popup: None,
        }
    }

    #[inline]
    pub fn state(&self) -> &ActiveViewState {
        &self.state
    }

    #[inline]
    pub fn layers(&self) -> &LayerRegistry {
        &self.layers
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn active_layer(&self) -> &Layer {
        self.layers
            .get(self.state.active_layer())
            .unwrap_or_else(|| self.layers.default_layer())
    }

    /// First paint: restored layer and camera without animation, restored
    /// table visibility and filter.
    pub fn initialize(&mut self, out: &mut impl ViewSurfaces) {
        let camera = self.state.camera();

        self.show_active_layer(out);
        out.animate_to(CameraTarget {
            center: lonlat_to_mercator(camera.center_lonlat),
            zoom: camera.zoom,
            duration: Duration::ZERO,
        });
        out.set_filter_text(self.state.filter_text());
        out.set_table_visible(self.state.table_visible());
        self.resync(out);
    }

    /// Activates `id`, or the default layer when `id` is unknown.
    pub fn select_layer(&mut self, id: &str, out: &mut impl ViewSurfaces) {
        let resolved = self.layers.resolve(Some(id)).to_string();

        self.state.set_active_layer(&resolved);
        self.state.save_active_layer(&mut self.store);

        self.show_active_layer(out);
        let layer = self.active_layer();
        out.animate_to(CameraTarget {
            center: lonlat_to_mercator(layer.spec.center),
            zoom: layer.spec.zoom,
            duration: LAYER_SWITCH_DURATION,
        });
        self.resync(out);
    }

    /// Commits raw filter text and restyles the active layer and its table.
    pub fn set_filter(&mut self, text: &str, out: &mut impl ViewSurfaces) {
        self.state.set_filter_text(text);
        self.state.save_filter(&mut self.store);
        self.resync(out);
    }

    pub fn set_table_visible(&mut self, visible: bool, out: &mut impl ViewSurfaces) {
        self.state.set_table_visible(visible);
        self.state.save_table_visible(&mut self.store);
        out.set_table_visible(visible);
    }

    /// Toggles coordinates in popups and refreshes the open one.
    pub fn set_show_coordinates(&mut self, show: bool, out: &mut impl ViewSurfaces) {
        self.state.set_show_coordinates(show);
        self.refresh_popup(out);
    }

    /// Camera settled after a pan, zoom or animation. Persists only.
    pub fn on_camera_changed(&mut self, center: [f64; 2], zoom: f64) {
        self.state.set_camera(CameraView {
            center_lonlat: mercator_to_lonlat(center),
            zoom,
        });
        self.state.save_camera(&mut self.store);
    }

    /// Bulk-replaces a layer's features. The active layer is resynchronized.
    pub fn replace_dataset(
        &mut self,
        layer_id: &str,
        records: Vec<FeatureRecord>,
        out: &mut impl ViewSurfaces,
    ) {
        let Some(layer) = self.layers.get_mut(layer_id) else {
            log::warn!("Dropping dataset for unknown layer '{}'", layer_id);
            return;
        };
        layer.dataset.replace_all(layer_id, records);
        log::info!(
            "Layer '{}': {} feature(s) (generation {})",
            layer_id,
            layer.dataset.len(),
            layer.dataset.generation()
        );

        if layer_id == self.state.active_layer() {
            self.refresh_popup(out);
            self.resync(out);
        }
    }

    /// Fits the camera to a feature and opens its popup. Unknown ids and
    /// features without geometry are warned about and change nothing.
    pub fn zoom_to_feature(
        &mut self,
        layer_id: &str,
        feature_id: &str,
        out: &mut impl ViewSurfaces,
    ) -> bool {
        let Some((point, content)) = self.feature_popup(layer_id, feature_id, false) else {
            return false;
        };

        out.fit_point(point, FEATURE_FIT);
        out.show_popup(point, content);
        self.popup = Some(PopupAnchor::Feature {
            layer_id: layer_id.to_string(),
            feature_id: feature_id.to_string(),
            force_coordinates: false,
        });
        true
    }

    /// Click on the map at `coordinate` (metres).
    pub fn on_map_click(&mut self, coordinate: [f64; 2], hit: MapHit, out: &mut impl ViewSurfaces) {
        match hit {
            MapHit::Feature(feature_id) => {
                let layer_id = self.state.active_layer().to_string();
                if let Some((point, content)) = self.feature_popup(&layer_id, &feature_id, false) {
                    out.show_popup(point, content);
                    self.popup = Some(PopupAnchor::Feature {
                        layer_id,
                        feature_id,
                        force_coordinates: false,
                    });
                }
            }
            // A multi-member cluster is not a feature hit; treat it as empty map.
            MapHit::Cluster(_) | MapHit::Nothing => {
                if self.state.show_coordinates() {
                    out.show_popup(coordinate, PopupContent::for_coordinate(coordinate));
                    self.popup = Some(PopupAnchor::Coordinate(coordinate));
                } else {
                    self.hide_popup(out);
                }
            }
        }
    }

    pub(crate) fn begin_presentation(
        &mut self,
        layer_id: &str,
        out: &mut impl ViewSurfaces,
    ) -> TourSnapshot {
        if self.state.active_layer() != layer_id {
            self.select_layer(layer_id, out);
        }

        let snapshot = TourSnapshot {
            filter_text: self.state.filter_text().to_string(),
            table_visible: self.state.table_visible(),
        };

        // Temporary override, not persisted.
        self.state.set_filter_text("");
        self.state.set_table_visible(true);
        out.set_filter_text("");
        out.set_table_visible(true);
        self.resync(out);

        snapshot
    }

    /// Shows one tour stop. `false` when the feature is gone or unplaceable.
    pub(crate) fn present_feature(
        &mut self,
        layer_id: &str,
        feature_id: &str,
        zoom: f64,
        duration: Duration,
        out: &mut impl ViewSurfaces,
    ) -> bool {
        let Some((point, content)) = self.feature_popup(layer_id, feature_id, true) else {
            return false;
        };

        out.animate_to(CameraTarget {
            center: point,
            zoom,
            duration,
        });
        out.show_popup(point, content);
        self.popup = Some(PopupAnchor::Feature {
            layer_id: layer_id.to_string(),
            feature_id: feature_id.to_string(),
            force_coordinates: true,
        });

        if !out.highlight_row(layer_id, feature_id) {
            log::debug!("No table row for '{}' in layer '{}'", feature_id, layer_id);
        }
        true
    }

    pub(crate) fn end_presentation(&mut self, snapshot: &TourSnapshot, out: &mut impl ViewSurfaces) {
        out.clear_highlight();

        self.state.set_filter_text(&snapshot.filter_text);
        self.state.set_table_visible(snapshot.table_visible);
        self.state.save_filter(&mut self.store);
        self.state.save_table_visible(&mut self.store);

        out.set_filter_text(&snapshot.filter_text);
        out.set_table_visible(snapshot.table_visible);
        self.resync(out);
    }

    fn show_active_layer(&mut self, out: &mut impl ViewSurfaces) {
        for layer in self.layers.iter() {
            out.set_layer_visible(layer.id(), layer.id() == self.state.active_layer());
        }
        self.hide_popup(out);
    }

    /// Map styles and table rows from the same committed (layer, filter).
    fn resync(&self, out: &mut impl ViewSurfaces) {
        let layer = self.active_layer();
        let query = self.state.query();

        out.apply_styles(project_styles(layer, &query));
        out.render_table(project_table(layer, &query));
    }

    fn hide_popup(&mut self, out: &mut impl ViewSurfaces) {
        if self.popup.take().is_some() {
            out.hide_popup();
        }
    }

    fn refresh_popup(&mut self, out: &mut impl ViewSurfaces) {
        match self.popup.clone() {
            None => {}
            Some(PopupAnchor::Feature {
                layer_id,
                feature_id,
                force_coordinates,
            }) => match self.feature_popup(&layer_id, &feature_id, force_coordinates) {
                Some((point, content)) => out.show_popup(point, content),
                None => self.hide_popup(out),
            },
            Some(PopupAnchor::Coordinate(coordinate)) => {
                if self.state.show_coordinates() {
                    out.show_popup(coordinate, PopupContent::for_coordinate(coordinate));
                } else {
                    self.hide_popup(out);
                }
            }
        }
    }

    /// Popup position and content for a feature, warning on a failed lookup.
    fn feature_popup(
        &self,
        layer_id: &str,
        feature_id: &str,
        force_coordinates: bool,
    ) -> Option<([f64; 2], PopupContent)> {
        let Some(layer) = self.layers.get(layer_id) else {
            log::warn!("Layer '{}' not found", layer_id);
            return None;
        };
        let Some(feature) = layer.dataset.get(feature_id) else {
            log::warn!("Feature with id={} not found in layer {}", feature_id, layer_id);
            return None;
        };
        let Some(point) = feature.geometry else {
            log::warn!("Feature '{}' in layer '{}' has no geometry", feature_id, layer_id);
            return None;
        };

        let show = force_coordinates || self.state.show_coordinates();
        Some((point, PopupContent::for_feature(feature, show)))
    }
}

/// Styles every feature of `layer` against `query`.
pub fn project_styles(layer: &Layer, query: &Query) -> StyledLayer {
    let spec = &layer.spec;

    StyledLayer {
        layer_id: spec.id.clone(),
        cluster_distance: spec.styling.cluster_distance(),
        features: layer
            .dataset
            .features()
            .iter()
            .map(|feature| StyledFeature {
                id: feature.id().to_string(),
                position: feature.geometry,
                style: style_for(feature, spec, query),
            })
            .collect(),
    }
}

/// Table rows for the features of `layer` matching `query`, in load order.
/// Columns follow the first listed feature's attributes.
pub fn project_table(layer: &Layer, query: &Query) -> TableView {
    let spec = &layer.spec;
    let matched: Vec<&FeatureRecord> = query
        .filter(layer.dataset.features(), &spec.search_fields)
        .collect();

    let columns: Vec<TableColumn> = matched
        .first()
        .map(|first| {
            first
                .attributes
                .keys()
                .filter(|key| !spec.hidden_columns.contains(key))
                .map(|key| TableColumn {
                    key: key.clone(),
                    label: spec.column_label(key).to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let rows = matched
        .iter()
        .map(|feature| TableRow {
            feature_id: feature.id().to_string(),
            cells: columns
                .iter()
                .map(|c| feature.attribute(&c.key).to_string())
                .collect(),
        })
        .collect();

    TableView {
        layer_id: spec.id.clone(),
        columns,
        rows,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::types::fixtures::{plain, point, spec};
    use crate::storage::{keys, MemoryStore};
    use crate::style::{Icon, Style, StylingPolicy};
    use crate::surfaces::recording::{Call, Recorder};
    use crate::surfaces::COORDINATES_TITLE;
    use std::collections::BTreeSet;

    /// Layer "parks" (A, B with geometry; C without) and an empty layer "other".
    pub fn synchronizer(store: MemoryStore) -> ViewSynchronizer<MemoryStore> {
        let mut parks = spec(
            "parks",
            &["name", "Name_en"],
            StylingPolicy::Plain { icon: Icon::Marker },
        );
        parks.hidden_columns = vec!["secret".into()];
        parks.column_labels.insert("name".into(), "Название".into());

        let layers = LayerRegistry::new(vec![parks, plain("other")]).unwrap();
        let mut sync = ViewSynchronizer::new(layers, store.with(keys::SELECTED_LAYER, "parks"));

        let mut records = vec![
            point("A", "Central Park", 10.0, 20.0).with_attribute("secret", "x"),
            point("B", "Lake", 30.0, 40.0).with_attribute("secret", "y"),
            FeatureRecord::new(None)
                .with_id("C")
                .with_attribute("name", "Park without place"),
        ];
        records[1] = records[1].clone().with_attribute("Name_en", "Lake Park");
        sync.replace_dataset("parks", records, &mut Recorder::default());
        sync
    }

    fn ids<'a>(it: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
        it.map(str::to_string).collect()
    }

    #[test]
    fn map_and_table_agree_after_every_filter() {
        let mut sync = synchronizer(MemoryStore::new());
        let mut out = Recorder::default();

        for query in ["", "park", "  LAKE ", "central", "nothing matches"] {
            sync.set_filter(query, &mut out);
            let styles = out.last_styles().unwrap();
            let table = out.last_table().unwrap();
            assert_eq!(styles.layer_id, table.layer_id);
            assert_eq!(ids(styles.visible_ids()), ids(table.row_ids()), "query {query:?}");
        }
    }

    #[test]
    fn filter_searches_every_layer_field_and_persists() {
        let mut sync = synchronizer(MemoryStore::new());
        let mut out = Recorder::default();

        sync.set_filter("park", &mut out);
        let table = out.last_table().unwrap();
        assert_eq!(table.row_ids().collect::<Vec<_>>(), ["A", "B", "C"]);
        assert_eq!(sync.store().get(keys::OBJECT_FILTER).as_deref(), Some("park"));

        sync.set_filter("central", &mut out);
        let styles = out.last_styles().unwrap();
        assert_eq!(styles.features[0].style, Some(Style::Icon(Icon::Marker)));
        assert_eq!(styles.features[1].style, None);
    }

    #[test]
    fn table_columns_follow_first_row_minus_hidden() {
        let sync = synchronizer(MemoryStore::new());
        let table = project_table(sync.active_layer(), &Query::parse(""));

        let labels: Vec<&str> = table.columns.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, ["Название"]);
        assert_eq!(table.rows[1].cells, ["Lake"]);

        let empty = project_table(sync.active_layer(), &Query::parse("zzz"));
        assert!(empty.is_empty());
        assert!(empty.columns.is_empty());
    }

    #[test]
    fn select_layer_resyncs_and_persists() {
        let mut sync = synchronizer(MemoryStore::new());
        let mut out = Recorder::default();
        sync.on_map_click([0.0, 0.0], MapHit::Nothing, &mut out);
        out.take();

        sync.select_layer("other", &mut out);
        let calls = out.take();

        assert_eq!(sync.state().active_layer(), "other");
        assert_eq!(sync.store().get(keys::SELECTED_LAYER).as_deref(), Some("other"));
        assert!(calls.contains(&Call::LayerVisible("parks".into(), false)));
        assert!(calls.contains(&Call::LayerVisible("other".into(), true)));
        assert!(calls.contains(&Call::HidePopup));
        assert!(matches!(calls.last(), Some(Call::Table(t)) if t.layer_id == "other"));
        assert!(calls.iter().any(|c| matches!(c, Call::AnimateTo(t) if t.duration == LAYER_SWITCH_DURATION)));
    }

    #[test]
    fn unknown_layer_falls_back_to_last_configured() {
        let mut sync = synchronizer(MemoryStore::new());
        sync.select_layer("deleted", &mut Recorder::default());
        assert_eq!(sync.state().active_layer(), "other");
    }

    #[test]
    fn table_visibility_does_not_restyle() {
        let mut sync = synchronizer(MemoryStore::new());
        let mut out = Recorder::default();

        sync.set_table_visible(false, &mut out);
        assert_eq!(out.take(), vec![Call::TableVisible(false)]);
        assert_eq!(sync.store().get(keys::SHOW_TABLE).as_deref(), Some("no"));
    }

    #[test]
    fn zoom_to_unknown_feature_changes_nothing() {
        let mut sync = synchronizer(MemoryStore::new());
        let mut out = Recorder::default();

        assert!(!sync.zoom_to_feature("parks", "stale-id", &mut out));
        assert!(!sync.zoom_to_feature("gone-layer", "A", &mut out));
        assert!(!sync.zoom_to_feature("parks", "C", &mut out));
        assert_eq!(out.camera_moves(), 0);
        assert!(out.popups().is_empty());
    }

    #[test]
    fn zoom_to_feature_fits_and_opens_popup() {
        let mut sync = synchronizer(MemoryStore::new());
        let mut out = Recorder::default();

        assert!(sync.zoom_to_feature("parks", "B", &mut out));
        assert_eq!(out.calls[0], Call::FitPoint([30.0, 40.0], FEATURE_FIT));
        assert_eq!(out.popups()[0].title, "Lake Park");
    }

    #[test]
    fn empty_click_follows_show_coordinates() {
        let mut sync = synchronizer(MemoryStore::new());
        let mut out = Recorder::default();

        sync.on_map_click([0.0, 0.0], MapHit::Nothing, &mut out);
        assert_eq!(out.popups()[0].title, "Coordinates");

        sync.set_show_coordinates(false, &mut out);
        assert_eq!(out.calls.last(), Some(&Call::HidePopup));

        out.take();
        sync.on_map_click([0.0, 0.0], MapHit::Nothing, &mut out);
        assert!(out.popups().is_empty());
    }

    #[test]
    fn feature_popup_refreshes_when_coordinates_toggle() {
        let mut sync = synchronizer(MemoryStore::new());
        let mut out = Recorder::default();

        sync.on_map_click([0.0, 0.0], MapHit::Feature("A".into()), &mut out);
        assert!(out.popups()[0].coordinates.is_some());

        sync.set_show_coordinates(false, &mut out);
        assert_eq!(out.popups().len(), 2);
        assert_eq!(out.popups()[1].coordinates, None);
    }

    #[test]
    fn cluster_click_behaves_like_empty_map() {
        let mut sync = synchronizer(MemoryStore::new());
        let mut out = Recorder::default();

        sync.on_map_click([0.0, 0.0], MapHit::Cluster(3), &mut out);
        let popups = out.popups();
        assert_eq!(popups.len(), 1);
        assert_eq!(popups[0].title, COORDINATES_TITLE);

        sync.set_show_coordinates(false, &mut out);
        sync.on_map_click([0.0, 0.0], MapHit::Feature("A".into()), &mut out);
        out.take();

        sync.on_map_click([0.0, 0.0], MapHit::Cluster(2), &mut out);
        assert_eq!(out.take(), vec![Call::HidePopup]);
    }

    #[test]
    fn camera_changes_persist_without_side_effects() {
        let mut sync = synchronizer(MemoryStore::new());
        sync.on_camera_changed(lonlat_to_mercator([37.5, 55.5]), 12.0);

        assert_eq!(sync.store().get(keys::MAP_ZOOM).as_deref(), Some("12"));
        let center: [f64; 2] =
            serde_json::from_str(&sync.store().get(keys::MAP_CENTER).unwrap()).unwrap();
        assert!((center[0] - 37.5).abs() < 1e-9);
        assert!((center[1] - 55.5).abs() < 1e-9);
    }

    #[test]
    fn reload_drops_popup_of_vanished_feature() {
        let mut sync = synchronizer(MemoryStore::new());
        let mut out = Recorder::default();
        sync.zoom_to_feature("parks", "A", &mut out);
        out.take();

        sync.replace_dataset("parks", vec![point("Z", "Zoo", 1.0, 1.0)], &mut out);
        let calls = out.take();
        assert_eq!(calls[0], Call::HidePopup);
        assert_eq!(
            calls.iter().filter(|c| matches!(c, Call::Table(_))).count(),
            1
        );
    }

    #[test]
    fn reload_of_inactive_layer_is_silent() {
        let mut sync = synchronizer(MemoryStore::new());
        let mut out = Recorder::default();
        sync.replace_dataset("other", vec![point("Q", "Q", 0.0, 0.0)], &mut out);
        assert!(out.calls.is_empty());
        assert_eq!(sync.layers().get("other").map(|l| l.dataset.len()), Some(1));
    }

    #[test]
    fn initialize_applies_restored_state_without_animation() {
        let store = MemoryStore::new()
            .with(keys::SHOW_TABLE, "no")
            .with(keys::OBJECT_FILTER, "lake");
        let mut sync = synchronizer(store);
        let mut out = Recorder::default();

        sync.initialize(&mut out);
        assert!(out.calls.contains(&Call::TableVisible(false)));
        assert!(out.calls.contains(&Call::FilterText("lake".into())));
        assert!(out
            .calls
            .iter()
            .any(|c| matches!(c, Call::AnimateTo(t) if t.duration == Duration::ZERO)));
        assert_eq!(out.last_table().unwrap().row_ids().collect::<Vec<_>>(), ["B"]);
    }
}
