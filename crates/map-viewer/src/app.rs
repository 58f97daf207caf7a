use crate::{
    config::{self, Config},
    data::{spawn_loads, LayerRegistry, LoadEvent},
    renderer::{FramePaint, Renderer},
    storage::FileStore,
    sync::ViewSynchronizer,
    tour::TourController,
    ui::{self, Scene, UiAction},
};
use anyhow::{Context as _, Result};
use crossbeam_channel::Receiver;
use std::{sync::Arc, time::Instant};
use winit::{event::WindowEvent, window::Window};

pub struct App {
    pub renderer: Renderer,
    pub egui_ctx: egui::Context,
    pub egui_state: egui_winit::State,
    pub scene: Scene,
    pub sync: ViewSynchronizer<FileStore>,
    pub tour: TourController,
    loads: Receiver<LoadEvent>,
    pending_loads: usize,
}

impl App {
    pub async fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        let specs = config::load_layers(config.layers.as_deref())
            .context("Failed to load layer configuration")?;
        let layers = LayerRegistry::new(specs.clone())?;
        let store = FileStore::open(&config.state_file);

        let mut sync = ViewSynchronizer::new(layers, store);
        let mut scene = Scene::new(Instant::now());
        // Datasets are still empty here; each is resynced as its load lands.
        sync.initialize(&mut scene);

        let renderer = Renderer::new(window.clone()).await?;

        let egui_ctx = egui::Context::default();
        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui_ctx.viewport_id(),
            &*window,
            None,
            None,
        );

        let (tx, loads) = crossbeam_channel::unbounded();
        let pending_loads = specs.len();
        log::info!(
            "Loading {} layer(s) from '{}'...",
            pending_loads,
            config.data_dir.display()
        );
        spawn_loads(specs, config.data_dir.clone(), tx);

        Ok(Self {
            renderer,
            egui_ctx,
            egui_state,
            scene,
            sync,
            tour: TourController::new(),
            loads,
            pending_loads,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.renderer.resize(new_size);
        }
    }

    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(window, event);
        if response.consumed {
            return true;
        }

        if let WindowEvent::Resized(physical_size) = event {
            self.resize(*physical_size);
        }

        false
    }

    /// Per-frame bookkeeping: finished loads, camera flights, tour steps.
    pub fn update(&mut self, now: Instant) {
        self.scene.now = now;

        while let Ok(event) = self.loads.try_recv() {
            self.pending_loads = self.pending_loads.saturating_sub(1);
            log::debug!(
                "Load of '{}' finished, {} pending",
                event.layer_id(),
                self.pending_loads
            );
            match event {
                LoadEvent::Loaded { layer_id, records } => {
                    self.sync.replace_dataset(&layer_id, records, &mut self.scene);
                }
                LoadEvent::Failed { layer_id, error } => {
                    log::error!("Layer '{}' stays empty: {}", layer_id, error);
                }
            }
            if self.pending_loads == 0 {
                log::info!("All layers loaded");
            }
        }

        if self.scene.camera.tick(now) {
            self.sync
                .on_camera_changed(self.scene.camera.center(), self.scene.camera.zoom());
        }

        self.tour.poll(now, &mut self.sync, &mut self.scene);
    }

    fn apply(&mut self, action: UiAction, now: Instant) {
        let (sync, scene) = (&mut self.sync, &mut self.scene);

        match action {
            UiAction::SelectLayer(id) => {
                self.tour.stop(sync, scene);
                sync.select_layer(&id, scene);
            }
            UiAction::SetFilter(text) => sync.set_filter(&text, scene),
            UiAction::SetTableVisible(visible) => sync.set_table_visible(visible, scene),
            UiAction::SetShowCoordinates(show) => sync.set_show_coordinates(show, scene),
            UiAction::ToggleTour => {
                let layer_id = sync.state().active_layer().to_string();
                self.tour.toggle(&layer_id, now, sync, scene);
            }
            UiAction::ZoomToFeature {
                layer_id,
                feature_id,
            } => {
                sync.zoom_to_feature(&layer_id, &feature_id, scene);
            }
            UiAction::MapPointerDown => self.tour.on_pointer_down(sync, scene),
            UiAction::MapClick { coordinate, hit } => sync.on_map_click(coordinate, hit, scene),
            UiAction::CameraSettled => {
                sync.on_camera_changed(scene.camera.center(), scene.camera.zoom())
            }
        }
    }

    pub fn render(&mut self, window: &Window) -> Result<(), wgpu::SurfaceError> {
        let now = Instant::now();
        self.update(now);

        let egui_input = self.egui_state.take_egui_input(window);
        self.egui_ctx.begin_frame(egui_input);

        let actions = ui::draw(
            &self.egui_ctx,
            &mut self.scene,
            &self.sync,
            self.tour.is_running(),
        );

        let egui_output = self.egui_ctx.end_frame();
        self.egui_state
            .handle_platform_output(window, egui_output.platform_output);

        for action in actions {
            self.apply(action, now);
        }

        let primitives = self
            .egui_ctx
            .tessellate(egui_output.shapes, self.egui_ctx.pixels_per_point());

        self.renderer.render(FramePaint {
            primitives,
            textures_delta: egui_output.textures_delta,
            pixels_per_point: self.egui_ctx.pixels_per_point(),
        })
    }
}
