use geodata::mercator;
use glam::DVec2;
use std::time::{Duration, Instant};

pub const MIN_ZOOM: f64 = 2.0;
pub const MAX_ZOOM: f64 = 19.0;

/// Ground resolution in metres per pixel at `zoom`.
#[inline]
pub fn resolution_at(zoom: f64) -> f64 {
    mercator::RESOLUTION_Z0 / 2f64.powf(zoom)
}

fn clamp_zoom(zoom: f64) -> f64 {
    if zoom.is_nan() {
        MIN_ZOOM
    } else {
        zoom.clamp(MIN_ZOOM, MAX_ZOOM)
    }
}

#[derive(Debug, Clone, Copy)]
struct Flight {
    from_center: DVec2,
    from_zoom: f64,
    to_center: DVec2,
    to_zoom: f64,
    start: Instant,
    duration: Duration,
}

/// A top-down Web-Mercator camera over a pixel viewport.
///
/// Screen coordinates are pixels relative to the viewport's top-left corner,
/// y pointing down. World coordinates are metres, y pointing north.
#[derive(Debug, Clone)]
pub struct MapCamera {
    center: DVec2,
    zoom: f64,
    viewport: DVec2,
    flight: Option<Flight>,
}

impl MapCamera {
    pub fn new(center: [f64; 2], zoom: f64) -> Self {
        Self {
            center: DVec2::from(center),
            zoom: clamp_zoom(zoom),
            viewport: DVec2::new(1280.0, 720.0),
            flight: None,
        }
    }

    pub fn set_viewport(&mut self, size: [f64; 2]) {
        self.viewport = DVec2::from(size).max(DVec2::ONE);
    }

    /// Centre in metres.
    #[inline]
    pub fn center(&self) -> [f64; 2] {
        self.center.into()
    }

    #[inline]
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    #[inline]
    pub fn resolution(&self) -> f64 {
        resolution_at(self.zoom)
    }

    #[inline]
    pub fn is_animating(&self) -> bool {
        self.flight.is_some()
    }

    pub fn world_to_screen(&self, world: [f64; 2]) -> [f64; 2] {
        let d = (DVec2::from(world) - self.center) / self.resolution();
        (self.viewport * 0.5 + DVec2::new(d.x, -d.y)).into()
    }

    pub fn screen_to_world(&self, screen: [f64; 2]) -> [f64; 2] {
        let d = DVec2::from(screen) - self.viewport * 0.5;
        (self.center + DVec2::new(d.x, -d.y) * self.resolution()).into()
    }

    /// Drags the map by a screen delta. Cancels any flight.
    pub fn pan_pixels(&mut self, delta: [f64; 2]) {
        self.flight = None;
        self.center -= DVec2::new(delta[0], -delta[1]) * self.resolution();
        self.center.y = self.center.y.clamp(-mercator::HALF_SIZE, mercator::HALF_SIZE);
    }

    /// Zooms by `delta` levels keeping the world point under `screen` fixed.
    pub fn zoom_at(&mut self, screen: [f64; 2], delta: f64) {
        self.flight = None;
        let anchor = DVec2::from(self.screen_to_world(screen));
        self.zoom = clamp_zoom(self.zoom + delta);

        let d = DVec2::from(screen) - self.viewport * 0.5;
        self.center = anchor - DVec2::new(d.x, -d.y) * self.resolution();
    }

    /// Starts a flight; a zero duration jumps.
    pub fn animate_to(&mut self, center: [f64; 2], zoom: f64, duration: Duration, now: Instant) {
        let to_center = DVec2::from(center);
        let to_zoom = clamp_zoom(zoom);

        if duration.is_zero() {
            self.center = to_center;
            self.zoom = to_zoom;
            self.flight = None;
            return;
        }

        self.flight = Some(Flight {
            from_center: self.center,
            from_zoom: self.zoom,
            to_center,
            to_zoom,
            start: now,
            duration,
        });
    }

    /// Flies to show the extent `min..max` inside the viewport less `padding_px`
    /// on every side, zooming in no further than `max_zoom`. A single point
    /// always lands on `max_zoom`.
    pub fn fit_extent(
        &mut self,
        min: [f64; 2],
        max: [f64; 2],
        padding_px: f64,
        max_zoom: f64,
        duration: Duration,
        now: Instant,
    ) {
        let (min, max) = (DVec2::from(min), DVec2::from(max));
        let room = (self.viewport - DVec2::splat(2.0 * padding_px)).max(DVec2::ONE);
        let res = ((max - min).abs() / room).max_element();

        let zoom = if res > 0.0 {
            (mercator::RESOLUTION_Z0 / res).log2()
        } else {
            f64::INFINITY
        };

        self.animate_to(((min + max) * 0.5).into(), zoom.min(max_zoom), duration, now);
    }

    /// Advances the flight. True on the frame it lands.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(flight) = self.flight else {
            return false;
        };

        let t = (now.saturating_duration_since(flight.start).as_secs_f64()
            / flight.duration.as_secs_f64())
        .min(1.0);
        // Smoothstep.
        let e = t * t * (3.0 - 2.0 * t);

        self.center = flight.from_center.lerp(flight.to_center, e);
        self.zoom = flight.from_zoom + (flight.to_zoom - flight.from_zoom) * e;

        if t >= 1.0 {
            self.flight = None;
            true
        } else {
            false
        }
    }
}
