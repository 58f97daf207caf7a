use crate::data::types::LayerRegistry;
use crate::filter::Query;
use crate::storage::{keys, KeyValueStore};

/// Camera centre used when nothing was persisted, `[lon, lat]`.
pub const DEFAULT_CENTER_LONLAT: [f64; 2] = [36.2754, 54.5293];
pub const DEFAULT_ZOOM: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    /// `[lon, lat]` degrees.
    pub center_lonlat: [f64; 2],
    pub zoom: f64,
}

impl Default for CameraView {
    fn default() -> Self {
        Self {
            center_lonlat: DEFAULT_CENTER_LONLAT,
            zoom: DEFAULT_ZOOM,
        }
    }
}

/// The single source of truth for what every view shows.
///
/// Fields change only through the `pub(crate)` setters, which the
/// synchronizer calls from its transition handlers. Persisting is a separate
/// step so that temporary overrides (the tour) can skip it.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveViewState {
    active_layer: String,
    filter_text: String,
    table_visible: bool,
    camera: CameraView,
    show_coordinates: bool,
}

impl ActiveViewState {
    /// Builds the state from `store`; every absent or unparseable key falls
    /// back to its default.
    pub fn restore(store: &impl KeyValueStore, layers: &LayerRegistry) -> Self {
        let active_layer = layers
            .resolve(store.get(keys::SELECTED_LAYER).as_deref())
            .to_string();

        let table_visible = store.get(keys::SHOW_TABLE).as_deref() != Some("no");
        let filter_text = store.get(keys::OBJECT_FILTER).unwrap_or_default();

        Self {
            active_layer,
            filter_text,
            table_visible,
            camera: restore_camera(store),
            show_coordinates: true,
        }
    }

    /// Defaults, with the last configured layer active.
    pub fn new(layers: &LayerRegistry) -> Self {
        Self {
            active_layer: layers.default_layer().id().to_string(),
            filter_text: String::new(),
            table_visible: true,
            camera: CameraView::default(),
            show_coordinates: true,
        }
    }

    #[inline]
    pub fn active_layer(&self) -> &str {
        &self.active_layer
    }

    /// Raw filter text as typed.
    #[inline]
    pub fn filter_text(&self) -> &str {
        &self.filter_text
    }

    /// The filter as compared against features.
    pub fn query(&self) -> Query {
        Query::parse(&self.filter_text)
    }

    #[inline]
    pub fn table_visible(&self) -> bool {
        self.table_visible
    }

    #[inline]
    pub fn camera(&self) -> CameraView {
        self.camera
    }

    #[inline]
    pub fn show_coordinates(&self) -> bool {
        self.show_coordinates
    }

    pub(crate) fn set_active_layer(&mut self, id: &str) {
        self.active_layer = id.to_string();
    }

    pub(crate) fn set_filter_text(&mut self, text: &str) {
        self.filter_text = text.to_string();
    }

    pub(crate) fn set_table_visible(&mut self, visible: bool) {
        self.table_visible = visible;
    }

    pub(crate) fn set_camera(&mut self, camera: CameraView) {
        self.camera = camera;
    }

    pub(crate) fn set_show_coordinates(&mut self, show: bool) {
        self.show_coordinates = show;
    }

    pub(crate) fn save_active_layer(&self, store: &mut impl KeyValueStore) {
        persist(store, keys::SELECTED_LAYER, &self.active_layer);
    }

    pub(crate) fn save_filter(&self, store: &mut impl KeyValueStore) {
        persist(store, keys::OBJECT_FILTER, &self.filter_text);
    }

    pub(crate) fn save_table_visible(&self, store: &mut impl KeyValueStore) {
        persist(store, keys::SHOW_TABLE, if self.table_visible { "yes" } else { "no" });
    }

    pub(crate) fn save_camera(&self, store: &mut impl KeyValueStore) {
        let [lon, lat] = self.camera.center_lonlat;
        match serde_json::to_string(&[lon, lat]) {
            Ok(center) => persist(store, keys::MAP_CENTER, &center),
            Err(err) => log::warn!("Cannot encode camera centre: {}", err),
        }
        persist(store, keys::MAP_ZOOM, &self.camera.zoom.to_string());
    }
}

fn restore_camera(store: &impl KeyValueStore) -> CameraView {
    let mut camera = CameraView::default();

    if let Some(raw) = store.get(keys::MAP_CENTER) {
        match serde_json::from_str::<[f64; 2]>(&raw) {
            Ok(center) if center.iter().all(|v| v.is_finite()) => camera.center_lonlat = center,
            _ => log::warn!("Ignoring persisted camera centre {:?}", raw),
        }
    }

    if let Some(raw) = store.get(keys::MAP_ZOOM) {
        match raw.trim().parse::<f64>() {
            Ok(zoom) if zoom.is_finite() => camera.zoom = zoom,
            _ => log::warn!("Ignoring persisted zoom {:?}", raw),
        }
    }

    camera
}

/// Failed writes are logged and otherwise ignored.
fn persist(store: &mut impl KeyValueStore, key: &str, value: &str) {
    if let Err(err) = store.set(key, value) {
        log::warn!("Failed to persist '{}': {}", key, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::fixtures;
    use crate::storage::MemoryStore;

    fn registry() -> LayerRegistry {
        LayerRegistry::new(vec![fixtures::plain("a"), fixtures::plain("b")]).unwrap()
    }

    #[test]
    fn empty_store_yields_defaults() {
        let state = ActiveViewState::restore(&MemoryStore::new(), &registry());
        assert_eq!(state, ActiveViewState::new(&registry()));
        assert_eq!(state.active_layer(), "b");
        assert!(state.table_visible());
        assert_eq!(state.filter_text(), "");
        assert_eq!(state.camera(), CameraView::default());
    }

    #[test]
    fn restores_every_persisted_key() {
        let store = MemoryStore::new()
            .with(keys::SELECTED_LAYER, "a")
            .with(keys::SHOW_TABLE, "no")
            .with(keys::OBJECT_FILTER, "  Park ")
            .with(keys::MAP_CENTER, "[37.6, 55.7]")
            .with(keys::MAP_ZOOM, "13.5");

        let state = ActiveViewState::restore(&store, &registry());
        assert_eq!(state.active_layer(), "a");
        assert!(!state.table_visible());
        assert_eq!(state.filter_text(), "  Park ");
        assert_eq!(state.query().as_str(), "park");
        assert_eq!(
            state.camera(),
            CameraView {
                center_lonlat: [37.6, 55.7],
                zoom: 13.5
            }
        );
    }

    #[test]
    fn garbage_values_fall_back_independently() {
        let store = MemoryStore::new()
            .with(keys::SELECTED_LAYER, "removed-layer")
            .with(keys::MAP_CENTER, "{oops")
            .with(keys::MAP_ZOOM, "12");

        let state = ActiveViewState::restore(&store, &registry());
        assert_eq!(state.active_layer(), "b");
        assert_eq!(state.camera().center_lonlat, DEFAULT_CENTER_LONLAT);
        assert_eq!(state.camera().zoom, 12.0);
    }

    #[test]
    fn save_then_restore() {
        let layers = registry();
        let mut store = MemoryStore::new();
        let mut state = ActiveViewState::new(&layers);

        state.set_active_layer("a");
        state.set_filter_text("lake");
        state.set_table_visible(false);
        state.set_camera(CameraView {
            center_lonlat: [1.5, -2.25],
            zoom: 4.0,
        });
        state.save_active_layer(&mut store);
        state.save_filter(&mut store);
        state.save_table_visible(&mut store);
        state.save_camera(&mut store);

        assert_eq!(store.get(keys::SHOW_TABLE).as_deref(), Some("no"));
        assert_eq!(ActiveViewState::restore(&store, &layers), state);
    }
}
