//! egui front end: the map canvas, the controls panel, the feature table and
//! the popup. [`Scene`] is the presenting side of the collaborator traits; the
//! draw functions only read it and report user input as [`UiAction`]s.

use crate::camera::MapCamera;
use crate::cluster::ClusterAggregator;
use crate::state::{DEFAULT_CENTER_LONLAT, DEFAULT_ZOOM};
use crate::storage::KeyValueStore;
use crate::style::{Icon, Style};
use crate::surfaces::{
    CameraTarget, FitOptions, MapHit, MapSurface, PopupContent, PopupSurface, StyledLayer,
    TableSurface, TableView, NO_DATA_MESSAGE,
};
use crate::sync::ViewSynchronizer;
use egui::{Align2, Color32, FontId, Pos2, Rect, RichText, Sense, Stroke, Vec2};
use geodata::{format_lonlat, lonlat_to_mercator, mercator_to_lonlat};
use std::collections::HashMap;
use std::time::Instant;

const MARKER_RADIUS: f32 = 7.0;
const CLUSTER_RADIUS: f32 = 13.0;
const HIT_SLOP: f32 = 4.0;
const CLUSTER_FILL: Color32 = Color32::from_rgb(0x19, 0x76, 0xd2);
const HIGHLIGHT: Color32 = Color32::from_rgb(0xff, 0xf2, 0xa8);

/// User input gathered during one frame, applied after it.
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    SelectLayer(String),
    SetFilter(String),
    SetTableVisible(bool),
    SetShowCoordinates(bool),
    ToggleTour,
    ZoomToFeature { layer_id: String, feature_id: String },
    MapPointerDown,
    MapClick { coordinate: [f64; 2], hit: MapHit },
    CameraSettled,
}

/// Everything on screen, as last pushed by the synchronizer.
pub struct Scene {
    pub camera: MapCamera,
    /// Frame time, used to start camera flights.
    pub now: Instant,
    layer_visible: HashMap<String, bool>,
    styled: HashMap<String, StyledLayer>,
    table: TableView,
    table_visible: bool,
    filter_input: String,
    highlighted: Option<(String, String)>,
    scroll_to_highlight: bool,
    popup: Option<([f64; 2], PopupContent)>,
    map_rect: Rect,
}

impl Scene {
    pub fn new(now: Instant) -> Self {
        Self {
            camera: MapCamera::new(lonlat_to_mercator(DEFAULT_CENTER_LONLAT), DEFAULT_ZOOM),
            now,
            layer_visible: HashMap::new(),
            styled: HashMap::new(),
            table: TableView::default(),
            table_visible: true,
            filter_input: String::new(),
            highlighted: None,
            scroll_to_highlight: false,
            popup: None,
            map_rect: Rect::NOTHING,
        }
    }

    fn visible_layers(&self) -> impl Iterator<Item = &StyledLayer> {
        self.styled
            .values()
            .filter(|l| self.layer_visible.get(&l.layer_id).copied().unwrap_or(false))
    }
}

impl MapSurface for Scene {
    fn set_layer_visible(&mut self, layer_id: &str, visible: bool) {
        self.layer_visible.insert(layer_id.to_string(), visible);
    }

    fn apply_styles(&mut self, layer: StyledLayer) {
        self.styled.insert(layer.layer_id.clone(), layer);
    }

    fn animate_to(&mut self, target: CameraTarget) {
        self.camera
            .animate_to(target.center, target.zoom, target.duration, self.now);
    }

    fn fit_point(&mut self, point: [f64; 2], options: FitOptions) {
        self.camera.fit_extent(
            point,
            point,
            options.padding_px,
            options.max_zoom,
            options.duration,
            self.now,
        );
    }
}

impl TableSurface for Scene {
    fn render_table(&mut self, table: TableView) {
        self.table = table;
    }

    fn set_table_visible(&mut self, visible: bool) {
        self.table_visible = visible;
    }

    fn set_filter_text(&mut self, text: &str) {
        self.filter_input = text.to_string();
    }

    fn highlight_row(&mut self, layer_id: &str, feature_id: &str) -> bool {
        let present = self.table.layer_id == layer_id && self.table.row_ids().any(|id| id == feature_id);
        self.highlighted = Some((layer_id.to_string(), feature_id.to_string()));
        self.scroll_to_highlight = present;
        present
    }

    fn clear_highlight(&mut self) {
        self.highlighted = None;
        self.scroll_to_highlight = false;
    }
}

impl PopupSurface for Scene {
    fn show_popup(&mut self, anchor: [f64; 2], content: PopupContent) {
        self.popup = Some((anchor, content));
    }

    fn hide_popup(&mut self) {
        self.popup = None;
    }
}

/// Draws one frame of UI and returns the user's input.
pub fn draw<S: KeyValueStore>(
    ctx: &egui::Context,
    scene: &mut Scene,
    sync: &ViewSynchronizer<S>,
    tour_running: bool,
) -> Vec<UiAction> {
    let mut actions = Vec::new();

    draw_controls(ctx, sync, tour_running, &mut actions);
    draw_table(ctx, scene, &mut actions);
    draw_map(ctx, scene, &mut actions);
    draw_popup(ctx, scene);

    actions
}

fn draw_controls<S: KeyValueStore>(
    ctx: &egui::Context,
    sync: &ViewSynchronizer<S>,
    tour_running: bool,
    actions: &mut Vec<UiAction>,
) {
    let state = sync.state();

    egui::SidePanel::left("controls")
        .resizable(false)
        .default_width(210.0)
        .show(ctx, |ui| {
            ui.heading("Layers");
            for layer in sync.layers().iter() {
                let selected = layer.id() == state.active_layer();
                let label = format!("{} ({})", layer.spec.title, layer.dataset.len());
                if ui.radio(selected, label).clicked() && !selected {
                    actions.push(UiAction::SelectLayer(layer.id().to_string()));
                }
            }

            ui.separator();
            ui.label("Table");
            ui.horizontal(|ui| {
                let visible = state.table_visible();
                if ui.radio(visible, "Show").clicked() && !visible {
                    actions.push(UiAction::SetTableVisible(true));
                }
                if ui.radio(!visible, "Hide").clicked() && visible {
                    actions.push(UiAction::SetTableVisible(false));
                }
            });

            ui.label("Coordinates in popups");
            ui.horizontal(|ui| {
                let show = state.show_coordinates();
                if ui.radio(show, "Yes").clicked() && !show {
                    actions.push(UiAction::SetShowCoordinates(true));
                }
                if ui.radio(!show, "No").clicked() && show {
                    actions.push(UiAction::SetShowCoordinates(false));
                }
            });

            ui.separator();
            let caption = if tour_running {
                "Stop presentation"
            } else {
                "Presentation mode"
            };
            if ui.button(caption).clicked() {
                actions.push(UiAction::ToggleTour);
            }
        });
}

fn draw_table(ctx: &egui::Context, scene: &mut Scene, actions: &mut Vec<UiAction>) {
    egui::TopBottomPanel::bottom("table")
        .resizable(true)
        .default_height(240.0)
        .show_animated(ctx, scene.table_visible, |ui| {
            ui.horizontal(|ui| {
                ui.label("Filter:");
                if ui.text_edit_singleline(&mut scene.filter_input).changed() {
                    actions.push(UiAction::SetFilter(scene.filter_input.clone()));
                }
            });
            ui.separator();

            let table = &scene.table;
            if table.is_empty() {
                ui.label(NO_DATA_MESSAGE);
                return;
            }

            egui::ScrollArea::both()
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    egui::Grid::new("features").striped(true).show(ui, |ui| {
                        for column in &table.columns {
                            ui.strong(&column.label);
                        }
                        ui.strong("Action");
                        ui.end_row();

                        for row in &table.rows {
                            let highlighted = scene.highlighted.as_ref().is_some_and(|(layer, id)| {
                                *layer == table.layer_id && *id == row.feature_id
                            });

                            for cell in &row.cells {
                                if highlighted {
                                    ui.label(RichText::new(cell).strong().background_color(HIGHLIGHT));
                                } else {
                                    ui.label(cell);
                                }
                            }

                            let button = ui.button("Show");
                            if highlighted && scene.scroll_to_highlight {
                                button.scroll_to_me(Some(egui::Align::Center));
                                scene.scroll_to_highlight = false;
                            }
                            if button.clicked() {
                                actions.push(UiAction::ZoomToFeature {
                                    layer_id: table.layer_id.clone(),
                                    feature_id: row.feature_id.clone(),
                                });
                            }
                            ui.end_row();
                        }
                    });
                });
        });
}

fn icon_color(icon: Icon) -> Color32 {
    match icon {
        Icon::Marker => Color32::from_rgb(0xd6, 0x3b, 0x3b),
        Icon::Landscape => Color32::from_rgb(0x9c, 0x7a, 0x3c),
        Icon::Water => Color32::from_rgb(0x28, 0x78, 0xdc),
        Icon::Heritage => Color32::from_rgb(0x9a, 0x3c, 0xa0),
        Icon::Forest => Color32::from_rgb(0x2e, 0x8b, 0x3e),
        Icon::Other => Color32::from_rgb(0x70, 0x70, 0x70),
    }
}

/// Something drawn this frame that a click can land on.
struct Drawn {
    pos: Pos2,
    radius: f32,
    hit: MapHit,
}

fn paint_style(painter: &egui::Painter, pos: Pos2, style: Style) -> f32 {
    match style {
        Style::Icon(icon) => {
            painter.circle(pos, MARKER_RADIUS, icon_color(icon), Stroke::new(2.0, Color32::WHITE));
            MARKER_RADIUS
        }
        Style::Cluster { count } => {
            painter.circle(pos, CLUSTER_RADIUS, CLUSTER_FILL, Stroke::new(2.0, Color32::WHITE));
            painter.text(
                pos,
                Align2::CENTER_CENTER,
                count.to_string(),
                FontId::proportional(13.0),
                Color32::WHITE,
            );
            CLUSTER_RADIUS
        }
    }
}

fn draw_map(ctx: &egui::Context, scene: &mut Scene, actions: &mut Vec<UiAction>) {
    egui::CentralPanel::default()
        .frame(egui::Frame::none())
        .show(ctx, |ui| {
            let (response, painter) = ui.allocate_painter(ui.available_size(), Sense::click_and_drag());
            let rect = response.rect;
            scene.map_rect = rect;
            scene
                .camera
                .set_viewport([rect.width() as f64, rect.height() as f64]);

            let to_local = |p: Pos2| -> [f64; 2] { [(p.x - rect.min.x) as f64, (p.y - rect.min.y) as f64] };
            let to_pos = |s: [f64; 2]| Pos2::new(rect.min.x + s[0] as f32, rect.min.y + s[1] as f32);

            // Gestures.
            if response.hovered() && ui.input(|i| i.pointer.any_pressed()) {
                actions.push(UiAction::MapPointerDown);
            }
            if response.dragged() {
                let d = response.drag_delta();
                scene.camera.pan_pixels([d.x as f64, d.y as f64]);
            }
            if response.drag_stopped() {
                actions.push(UiAction::CameraSettled);
            }
            if let Some(hover) = response.hover_pos() {
                let scroll = ui.input(|i| i.raw_scroll_delta.y);
                if scroll != 0.0 {
                    scene.camera.zoom_at(to_local(hover), scroll as f64 / 120.0);
                    actions.push(UiAction::CameraSettled);
                }
            }

            let mut drawn: Vec<Drawn> = Vec::new();
            for layer in scene.visible_layers() {
                let placed: Vec<(usize, [f64; 2])> = layer
                    .features
                    .iter()
                    .enumerate()
                    .filter_map(|(i, f)| f.position.map(|p| (i, scene.camera.world_to_screen(p))))
                    .collect();

                match layer.cluster_distance {
                    Some(distance) => {
                        let screen: Vec<[f64; 2]> = placed.iter().map(|(_, s)| *s).collect();
                        for cluster in ClusterAggregator::new(distance).aggregate(&screen) {
                            let Some(style) = cluster.style(|m| layer.features[placed[m].0].style) else {
                                continue;
                            };
                            let hit = match cluster.members.as_slice() {
                                [only] => MapHit::Feature(layer.features[placed[*only].0].id.clone()),
                                members => MapHit::Cluster(members.len()),
                            };
                            let pos = to_pos(cluster.center);
                            if rect.expand(CLUSTER_RADIUS).contains(pos) {
                                let radius = paint_style(&painter, pos, style);
                                drawn.push(Drawn { pos, radius, hit });
                            }
                        }
                    }
                    None => {
                        for (i, screen) in &placed {
                            let feature = &layer.features[*i];
                            let Some(style) = feature.style else { continue };
                            let pos = to_pos(*screen);
                            if rect.expand(MARKER_RADIUS).contains(pos) {
                                let radius = paint_style(&painter, pos, style);
                                drawn.push(Drawn {
                                    pos,
                                    radius,
                                    hit: MapHit::Feature(feature.id.clone()),
                                });
                            }
                        }
                    }
                }
            }

            if response.clicked() {
                if let Some(click) = response.interact_pointer_pos() {
                    // Topmost (last drawn) wins.
                    let hit = drawn
                        .iter()
                        .rev()
                        .find(|d| d.pos.distance(click) <= d.radius + HIT_SLOP)
                        .map(|d| d.hit.clone())
                        .unwrap_or(MapHit::Nothing);
                    actions.push(UiAction::MapClick {
                        coordinate: scene.camera.screen_to_world(to_local(click)),
                        hit,
                    });
                }
            }

            let lonlat = mercator_to_lonlat(scene.camera.center());
            painter.text(
                rect.left_bottom() + Vec2::new(8.0, -8.0),
                Align2::LEFT_BOTTOM,
                format!("{}  z{:.1}", format_lonlat(lonlat, 4), scene.camera.zoom()),
                FontId::monospace(12.0),
                Color32::from_gray(60),
            );
        });
}

fn draw_popup(ctx: &egui::Context, scene: &Scene) {
    let Some((anchor, content)) = &scene.popup else {
        return;
    };

    let [x, y] = scene.camera.world_to_screen(*anchor);
    let pos = Pos2::new(scene.map_rect.min.x + x as f32, scene.map_rect.min.y + y as f32);
    if !scene.map_rect.contains(pos) {
        return;
    }

    egui::Area::new(egui::Id::new("feature-popup"))
        .order(egui::Order::Foreground)
        .pivot(Align2::CENTER_BOTTOM)
        .fixed_pos(pos - Vec2::new(0.0, MARKER_RADIUS + 4.0))
        .interactable(false)
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.set_max_width(260.0);
                ui.strong(&content.title);
                if !content.description.is_empty() {
                    ui.label(&content.description);
                }
                if let Some(coordinates) = &content.coordinates {
                    ui.small(coordinates);
                }
            });
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surfaces::TableRow;

    fn table() -> TableView {
        TableView {
            layer_id: "parks".into(),
            columns: Vec::new(),
            rows: vec![TableRow {
                feature_id: "A".into(),
                cells: Vec::new(),
            }],
        }
    }

    #[test]
    fn highlight_reports_missing_rows() {
        let mut scene = Scene::new(Instant::now());
        scene.render_table(table());

        assert!(scene.highlight_row("parks", "A"));
        assert!(scene.scroll_to_highlight);
        assert!(!scene.highlight_row("parks", "Z"));
        assert!(!scene.highlight_row("other", "A"));

        scene.clear_highlight();
        assert!(scene.highlighted.is_none());
    }

    #[test]
    fn only_visible_layers_are_drawn() {
        let mut scene = Scene::new(Instant::now());
        for id in ["a", "b"] {
            scene.apply_styles(StyledLayer {
                layer_id: id.into(),
                ..StyledLayer::default()
            });
        }
        scene.set_layer_visible("a", false);
        scene.set_layer_visible("b", true);

        let ids: Vec<&str> = scene.visible_layers().map(|l| l.layer_id.as_str()).collect();
        assert_eq!(ids, ["b"]);
    }

    #[test]
    fn camera_requests_use_frame_time() {
        let t0 = Instant::now();
        let mut scene = Scene::new(t0);
        scene.animate_to(CameraTarget {
            center: [0.0, 0.0],
            zoom: 12.0,
            duration: std::time::Duration::from_secs(1),
        });
        assert!(scene.camera.is_animating());
        assert!(scene.camera.tick(t0 + std::time::Duration::from_secs(1)));
        assert_eq!(scene.camera.zoom(), 12.0);
    }
}
