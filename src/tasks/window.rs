use std::time::Duration;

use tokio::time::Instant;

use crate::domain::{DispatchLimits, LimitsUpdate};

pub const HOUR: Duration = Duration::from_secs(60 * 60);
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct RateWindow {
    pub hour_count: u32,
    pub day_count: u32,
    pub hour_window_start: Instant,
    pub day_window_start: Instant,
    pub limits: DispatchLimits,
}

impl RateWindow {
    pub fn new(limits: DispatchLimits, now: Instant) -> Self {
        Self {
            hour_count: 0,
            day_count: 0,
            hour_window_start: now,
            day_window_start: now,
            limits,
        }
    }

    pub fn roll(&mut self, now: Instant) {
        if now.saturating_duration_since(self.hour_window_start) >= HOUR {
            self.hour_count = 0;
            self.hour_window_start = now;
        }
        if now.saturating_duration_since(self.day_window_start) >= DAY {
            self.day_count = 0;
            self.day_window_start = now;
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.hour_count < self.limits.per_hour && self.day_count < self.limits.per_day
    }

    pub fn record(&mut self) {
        self.hour_count = self.hour_count.saturating_add(1);
        self.day_count = self.day_count.saturating_add(1);
    }

    pub fn apply(&mut self, update: LimitsUpdate) {
        self.limits = self.limits.merged(update);
    }
}
