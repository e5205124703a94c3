use foundation::time::Time;

/// Debounce configuration for viewport settle handling.
///
/// Delays grow as zoom shrinks: at coarse zoom the user is likely to keep
/// adjusting the view, so recomputing early is wasted work.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScheduleConfig {
    /// Below this zoom a settled pass is discarded outright.
    pub min_update_zoom: f64,
    /// At or above this zoom a completed pass is followed by image prefetch.
    pub prefetch_zoom: f64,
    pub slow_delay_s: f64,
    pub slow_below_zoom: f64,
    pub medium_delay_s: f64,
    pub medium_below_zoom: f64,
    pub fast_delay_s: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            min_update_zoom: 6.0,
            prefetch_zoom: 12.0,
            slow_delay_s: 0.8,
            slow_below_zoom: 10.0,
            medium_delay_s: 0.6,
            medium_below_zoom: 14.0,
            fast_delay_s: 0.4,
        }
    }
}

/// A reconcile pass waiting for its settle delay to elapse.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PendingPass {
    pub generation: u64,
    pub due_at: Time,
    pub zoom: f64,
}

/// Coalesces high-frequency viewport events into at most one pending pass.
///
/// A newer settle event fully supersedes a pending one (last write wins, not
/// queued), and nothing is delivered while the viewport is still moving.
/// Each scheduled pass carries a monotonically increasing generation that
/// downstream consumers use to reject stale asynchronous results.
#[derive(Debug)]
pub struct ViewportScheduler {
    config: ScheduleConfig,
    moving: bool,
    pending: Option<PendingPass>,
    next_generation: u64,
}

impl ViewportScheduler {
    pub fn new(config: ScheduleConfig) -> Self {
        Self {
            config,
            moving: false,
            pending: None,
            next_generation: 1,
        }
    }

    pub fn config(&self) -> ScheduleConfig {
        self.config
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn pending(&self) -> Option<PendingPass> {
        self.pending
    }

    pub fn settle_delay_s(&self, zoom: f64) -> f64 {
        if zoom < self.config.slow_below_zoom {
            self.config.slow_delay_s
        } else if zoom < self.config.medium_below_zoom {
            self.config.medium_delay_s
        } else {
            self.config.fast_delay_s
        }
    }

    /// Pan/zoom began: suppress recomputation and drop any pending pass.
    pub fn on_move_start(&mut self) {
        self.moving = true;
        self.pending = None;
    }

    /// Pan/zoom settled: schedule a pass after the zoom-scaled delay.
    ///
    /// Returns the generation assigned to the scheduled pass.
    pub fn on_move_end(&mut self, now: Time, zoom: f64) -> u64 {
        self.moving = false;
        let generation = self.next_generation;
        self.next_generation += 1;
        self.pending = Some(PendingPass {
            generation,
            due_at: now.after(self.settle_delay_s(zoom)),
            zoom,
        });
        generation
    }

    /// Delivers the pending pass once its delay has elapsed.
    ///
    /// Never delivers while moving; a pass at too coarse a zoom is consumed
    /// and discarded rather than delivered.
    pub fn poll(&mut self, now: Time) -> Option<PendingPass> {
        if self.moving {
            return None;
        }
        let pass = self.pending?;
        if now < pass.due_at {
            return None;
        }
        self.pending = None;
        if pass.zoom < self.config.min_update_zoom {
            return None;
        }
        Some(pass)
    }

    pub fn wants_prefetch(&self, zoom: f64) -> bool {
        zoom >= self.config.prefetch_zoom
    }
}
