//! Contracts between the synchronizer and the views it drives.
//!
//! The synchronizer never draws. It computes structured view models
//! ([`StyledLayer`], [`TableView`], [`PopupContent`]) and hands them to the
//! map, table and popup surfaces, which only present them.

use crate::style::Style;
use geodata::{format_lonlat, mercator_to_lonlat, FeatureRecord};
use std::time::Duration;

/// Attributes tried in order for a popup title.
pub const POPUP_NAME_FIELDS: [&str; 3] = ["Название_ru", "Name_en", "name"];
pub const POPUP_FALLBACK_TITLE: &str = "Marker";
pub const COORDINATES_TITLE: &str = "Coordinates";
pub const COORDINATE_DECIMALS: usize = 6;
pub const NO_DATA_MESSAGE: &str = "No data to display";

#[derive(Debug, Clone, PartialEq)]
pub struct StyledFeature {
    pub id: String,
    /// Web-Mercator metres; `None` for features the map cannot place.
    pub position: Option<[f64; 2]>,
    /// `None` is hidden.
    pub style: Option<Style>,
}

/// Styles for every feature of one layer, in load order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StyledLayer {
    pub layer_id: String,
    /// Pixel distance for clustering, when the layer clusters.
    pub cluster_distance: Option<f64>,
    pub features: Vec<StyledFeature>,
}

impl StyledLayer {
    /// Ids of features that resolve to a visible style.
    pub fn visible_ids(&self) -> impl Iterator<Item = &str> {
        self.features
            .iter()
            .filter(|f| f.style.is_some())
            .map(|f| f.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableColumn {
    /// Attribute name.
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub feature_id: String,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableView {
    pub layer_id: String,
    pub columns: Vec<TableColumn>,
    pub rows: Vec<TableRow>,
}

impl TableView {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_ids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.feature_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PopupContent {
    pub title: String,
    pub description: String,
    /// `"<lon>, <lat>"`, when coordinates are shown.
    pub coordinates: Option<String>,
}

impl PopupContent {
    pub fn for_feature(feature: &FeatureRecord, show_coordinates: bool) -> Self {
        let title = POPUP_NAME_FIELDS
            .iter()
            .map(|field| feature.attribute(field))
            .find(|value| !value.is_empty())
            .unwrap_or(POPUP_FALLBACK_TITLE)
            .to_string();

        let coordinates = if show_coordinates {
            feature
                .lonlat()
                .map(|lonlat| format_lonlat(lonlat, COORDINATE_DECIMALS))
        } else {
            None
        };

        Self {
            title,
            description: feature.attribute("description").to_string(),
            coordinates,
        }
    }

    /// Popup for a bare map location, `mercator` in metres.
    pub fn for_coordinate(mercator: [f64; 2]) -> Self {
        Self {
            title: COORDINATES_TITLE.to_string(),
            description: String::new(),
            coordinates: Some(format_lonlat(mercator_to_lonlat(mercator), COORDINATE_DECIMALS)),
        }
    }
}

/// An animated camera move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTarget {
    /// Web-Mercator metres.
    pub center: [f64; 2],
    pub zoom: f64,
    /// Zero jumps without animating.
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub padding_px: f64,
    pub max_zoom: f64,
    pub duration: Duration,
}

/// What a map click landed on.
#[derive(Debug, Clone, PartialEq)]
pub enum MapHit {
    Feature(String),
    /// A cluster with this many members.
    Cluster(usize),
    Nothing,
}

pub trait MapSurface {
    fn set_layer_visible(&mut self, layer_id: &str, visible: bool);
    fn apply_styles(&mut self, layer: StyledLayer);
    fn animate_to(&mut self, target: CameraTarget);
    fn fit_point(&mut self, point: [f64; 2], options: FitOptions);
}

pub trait TableSurface {
    fn render_table(&mut self, table: TableView);
    fn set_table_visible(&mut self, visible: bool);
    fn set_filter_text(&mut self, text: &str);
    /// Highlights the row and scrolls it into view. `false` when no such row
    /// is rendered.
    fn highlight_row(&mut self, layer_id: &str, feature_id: &str) -> bool;
    fn clear_highlight(&mut self);
}

pub trait PopupSurface {
    /// `anchor` in Web-Mercator metres.
    fn show_popup(&mut self, anchor: [f64; 2], content: PopupContent);
    fn hide_popup(&mut self);
}

/// Everything the synchronizer drives in one handler.
pub trait ViewSurfaces: MapSurface + TableSurface + PopupSurface {}

impl<T: MapSurface + TableSurface + PopupSurface> ViewSurfaces for T {}

#[cfg(test)]
pub(crate) mod recording {
    //! A surface that records every call, for synchronizer and tour tests.

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        LayerVisible(String, bool),
        Styles(StyledLayer),
        AnimateTo(CameraTarget),
        FitPoint([f64; 2], FitOptions),
        Table(TableView),
        TableVisible(bool),
        FilterText(String),
        Highlight(String, String),
        ClearHighlight,
        ShowPopup([f64; 2], PopupContent),
        HidePopup,
    }

    #[derive(Debug, Default)]
    pub struct Recorder {
        pub calls: Vec<Call>,
    }

    impl Recorder {
        pub fn take(&mut self) -> Vec<Call> {
            std::mem::take(&mut self.calls)
        }

        pub fn last_styles(&self) -> Option<&StyledLayer> {
            self.calls.iter().rev().find_map(|c| match c {
                Call::Styles(layer) => Some(layer),
                _ => None,
            })
        }

        pub fn last_table(&self) -> Option<&TableView> {
            self.calls.iter().rev().find_map(|c| match c {
                Call::Table(table) => Some(table),
                _ => None,
            })
        }

        pub fn popups(&self) -> Vec<&PopupContent> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Call::ShowPopup(_, content) => Some(content),
                    _ => None,
                })
                .collect()
        }

        pub fn highlights(&self) -> Vec<&str> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Highlight(_, id) => Some(id.as_str()),
                    _ => None,
                })
                .collect()
        }

        pub fn camera_moves(&self) -> usize {
            self.calls
                .iter()
                .filter(|c| matches!(c, Call::AnimateTo(_) | Call::FitPoint(..)))
                .count()
        }
    }

    impl MapSurface for Recorder {
        fn set_layer_visible(&mut self, layer_id: &str, visible: bool) {
            self.calls.push(Call::LayerVisible(layer_id.into(), visible));
        }
        fn apply_styles(&mut self, layer: StyledLayer) {
            self.calls.push(Call::Styles(layer));
        }
        fn animate_to(&mut self, target: CameraTarget) {
            self.calls.push(Call::AnimateTo(target));
        }
        fn fit_point(&mut self, point: [f64; 2], options: FitOptions) {
            self.calls.push(Call::FitPoint(point, options));
        }
    }

    impl TableSurface for Recorder {
        fn render_table(&mut self, table: TableView) {
            self.calls.push(Call::Table(table));
        }
        fn set_table_visible(&mut self, visible: bool) {
            self.calls.push(Call::TableVisible(visible));
        }
        fn set_filter_text(&mut self, text: &str) {
            self.calls.push(Call::FilterText(text.into()));
        }
        fn highlight_row(&mut self, layer_id: &str, feature_id: &str) -> bool {
            self.calls.push(Call::Highlight(layer_id.into(), feature_id.into()));
            true
        }
        fn clear_highlight(&mut self) {
            self.calls.push(Call::ClearHighlight);
        }
    }

    impl PopupSurface for Recorder {
        fn show_popup(&mut self, anchor: [f64; 2], content: PopupContent) {
            self.calls.push(Call::ShowPopup(anchor, content));
        }
        fn hide_popup(&mut self) {
            self.calls.push(Call::HidePopup);
        }
    }
}
