//! Presentation tour.
//!
//! A two-state machine (`Idle`, `Running`) driven by the UI loop: the caller
//! polls with the current time and the controller fires at most one step per
//! due deadline. There is exactly one [`StepTimer`] per session and it is
//! cancelled on every stop, so no step can fire after the state has been
//! restored.

use crate::storage::KeyValueStore;
use crate::surfaces::ViewSurfaces;
use crate::sync::ViewSynchronizer;
use std::time::{Duration, Instant};

/// Time each stop stays on screen.
pub const TOUR_STEP_DELAY: Duration = Duration::from_millis(2500);
pub const TOUR_ZOOM: f64 = 15.0;
pub const TOUR_FLIGHT_DURATION: Duration = Duration::from_millis(1000);

/// View state a tour overrides and restores on stop.
#[derive(Debug, Clone, PartialEq)]
pub struct TourSnapshot {
    pub filter_text: String,
    pub table_visible: bool,
}

/// A single-shot, cancellable deadline.
#[derive(Debug, Default)]
pub struct StepTimer {
    deadline: Option<Instant>,
}

impl StepTimer {
    /// Arms the timer, replacing any pending deadline.
    pub fn arm(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    /// Disarms the timer. Cancelling a fired or idle timer is a no-op;
    /// returns whether a deadline was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once per armed deadline, when `now` has reached it.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct TourSession {
    layer_id: String,
    /// Ids of features with geometry, in load order, fixed at start.
    stops: Vec<String>,
    /// Next stop to show.
    index: usize,
    timer: StepTimer,
    snapshot: TourSnapshot,
}

impl TourSession {
    pub fn layer_id(&self) -> &str {
        &self.layer_id
    }

    pub fn stops(&self) -> &[String] {
        &self.stops
    }
}

#[derive(Debug, Default)]
pub enum TourState {
    #[default]
    Idle,
    Running(TourSession),
}

#[derive(Debug, Default)]
pub struct TourController {
    state: TourState,
    steps_shown: u64,
}

impl TourController {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self.state, TourState::Running(_))
    }

    pub fn session(&self) -> Option<&TourSession> {
        match &self.state {
            TourState::Running(session) => Some(session),
            TourState::Idle => None,
        }
    }

    /// When the next step is due, if one is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.session().and_then(|s| s.timer.deadline())
    }

    /// Stops shown since construction, the first stop of each tour included.
    #[inline]
    pub fn steps_shown(&self) -> u64 {
        self.steps_shown
    }

    /// Starts a tour over `layer_id`, stopping a running one first. Shows the
    /// first stop at once. Stays idle when the layer has nothing to visit.
    pub fn start<S: KeyValueStore>(
        &mut self,
        layer_id: &str,
        now: Instant,
        sync: &mut ViewSynchronizer<S>,
        out: &mut impl ViewSurfaces,
    ) -> bool {
        self.stop(sync, out);

        let Some(layer) = sync.layers().get(layer_id) else {
            log::warn!("Cannot tour unknown layer '{}'", layer_id);
            return false;
        };

        let features = layer.dataset.features();
        let stops: Vec<String> = features
            .iter()
            .filter(|f| f.geometry.is_some())
            .map(|f| f.id().to_string())
            .collect();

        if stops.len() < features.len() {
            log::warn!(
                "Tour of '{}' skips {} feature(s) without geometry",
                layer_id,
                features.len() - stops.len()
            );
        }
        if stops.is_empty() {
            log::info!("Layer '{}' has nothing to tour", layer_id);
            return false;
        }

        let snapshot = sync.begin_presentation(layer_id, out);
        let mut session = TourSession {
            layer_id: layer_id.to_string(),
            stops,
            index: 0,
            timer: StepTimer::default(),
            snapshot,
        };
        log::info!("Presentation tour of '{}': {} stop(s)", layer_id, session.stops.len());

        if !Self::advance(&mut session, now, sync, out) {
            sync.end_presentation(&session.snapshot, out);
            return false;
        }

        self.steps_shown += 1;
        self.state = TourState::Running(session);
        true
    }

    /// Stops a running tour and restores the pre-tour view. No-op when idle.
    pub fn stop<S: KeyValueStore>(
        &mut self,
        sync: &mut ViewSynchronizer<S>,
        out: &mut impl ViewSurfaces,
    ) -> bool {
        match std::mem::take(&mut self.state) {
            TourState::Idle => false,
            TourState::Running(mut session) => {
                session.timer.cancel();
                sync.end_presentation(&session.snapshot, out);
                log::info!("Presentation tour of '{}' stopped", session.layer_id);
                true
            }
        }
    }

    /// The tour button: stop when running, otherwise start.
    pub fn toggle<S: KeyValueStore>(
        &mut self,
        layer_id: &str,
        now: Instant,
        sync: &mut ViewSynchronizer<S>,
        out: &mut impl ViewSurfaces,
    ) -> bool {
        if self.is_running() {
            self.stop(sync, out);
            false
        } else {
            self.start(layer_id, now, sync, out)
        }
    }

    /// Any pointer-down on the map interrupts the tour.
    pub fn on_pointer_down<S: KeyValueStore>(
        &mut self,
        sync: &mut ViewSynchronizer<S>,
        out: &mut impl ViewSurfaces,
    ) {
        if self.stop(sync, out) {
            log::debug!("Tour interrupted by map interaction");
        }
    }

    /// Fires the pending step when due. Returns whether a stop was shown.
    pub fn poll<S: KeyValueStore>(
        &mut self,
        now: Instant,
        sync: &mut ViewSynchronizer<S>,
        out: &mut impl ViewSurfaces,
    ) -> bool {
        let TourState::Running(session) = &mut self.state else {
            return false;
        };
        if !session.timer.take_due(now) {
            return false;
        }

        if Self::advance(session, now, sync, out) {
            self.steps_shown += 1;
            true
        } else {
            log::warn!("No tour stop can be shown any more, stopping");
            self.stop(sync, out);
            false
        }
    }

    /// Shows the next presentable stop, moves the index on cyclically and
    /// rearms the timer. Stale stops are skipped.
    fn advance<S: KeyValueStore>(
        session: &mut TourSession,
        now: Instant,
        sync: &mut ViewSynchronizer<S>,
        out: &mut impl ViewSurfaces,
    ) -> bool {
        let len = session.stops.len();

        for _ in 0..len {
            let idx = session.index;
            session.index = (idx + 1) % len;

            let shown = sync.present_feature(
                &session.layer_id,
                &session.stops[idx],
                TOUR_ZOOM,
                TOUR_FLIGHT_DURATION,
                out,
            );
            if shown {
                session.timer.arm(now, TOUR_STEP_DELAY);
                return true;
            }
            log::warn!("Skipping tour stop '{}'", session.stops[idx]);
        }

        false
    }
}
