use std::{ops::RangeInclusive, time::Duration};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::time::Instant;

use crate::config::PacingConfig;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

pub trait PacingSource: Send + Sync {
    fn micro_break_interval(&mut self) -> u32;
    fn jitter(&mut self) -> Duration;
    fn micro_break(&mut self) -> Duration;
}

pub struct RandomPacing {
    rng: StdRng,
    config: PacingConfig,
}

impl RandomPacing {
    pub fn new(config: PacingConfig) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            config,
        }
    }

    #[cfg(test)]
    pub fn seeded(config: PacingConfig, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
        }
    }

    fn uniform(&mut self, range: &RangeInclusive<Duration>) -> Duration {
        let (lo, hi) = (range.start().as_millis() as u64, range.end().as_millis() as u64);
        if hi <= lo {
            return *range.start();
        }
        Duration::from_millis(self.rng.gen_range(lo..=hi))
    }
}

impl PacingSource for RandomPacing {
    fn micro_break_interval(&mut self) -> u32 {
        let range = self.config.micro_break_every.clone();
        if range.end() <= range.start() {
            return (*range.start()).max(1);
        }
        self.rng.gen_range(range).max(1)
    }

    fn jitter(&mut self) -> Duration {
        let range = self.config.jitter.clone();
        self.uniform(&range)
    }

    fn micro_break(&mut self) -> Duration {
        let range = self.config.micro_break.clone();
        self.uniform(&range)
    }
}
