//! Simulation timing.
//!
//! Converts variable frame deltas into fixed simulation ticks and tracks
//! how long ticks take to run.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Fixed ticks allowed per frame before the backlog is dropped.
const MAX_TICKS_PER_FRAME: u32 = 10;

/// Fixed-timestep accumulator.
#[derive(Debug, Clone)]
pub struct FixedStep {
    /// Seconds per tick
    fixed_dt: f32,
    /// Unsimulated time carried between frames
    accumulator: f32,
    /// Largest frame delta accepted
    max_dt: f32,
    /// Ticks produced so far
    ticks: u64,
}

impl Default for FixedStep {
    fn default() -> Self {
        Self::new(60)
    }
}

impl FixedStep {
    /// Creates an accumulator running `tick_rate` ticks per second.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        Self {
            fixed_dt: 1.0 / tick_rate.max(1) as f32,
            accumulator: 0.0,
            max_dt: 0.25,
            ticks: 0,
        }
    }

    /// Seconds per tick.
    #[must_use]
    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }

    /// Ticks produced so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Simulated seconds so far.
    #[must_use]
    pub fn elapsed(&self) -> f64 {
        self.ticks as f64 * f64::from(self.fixed_dt)
    }

    /// Adds a frame delta and returns how many ticks to run.
    pub fn accumulate(&mut self, dt: f32) -> u32 {
        self.accumulator += dt.clamp(0.0, self.max_dt);
        let mut count = 0;

        while self.accumulator >= self.fixed_dt && count < MAX_TICKS_PER_FRAME {
            self.accumulator -= self.fixed_dt;
            count += 1;
        }

        // Still behind: drop the backlog
        if self.accumulator > self.fixed_dt * 2.0 {
            self.accumulator = 0.0;
        }

        self.ticks += u64::from(count);
        count
    }

    /// Fraction of a tick left in the accumulator.
    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.accumulator / self.fixed_dt
    }

    /// Clears the accumulator and tick count.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.ticks = 0;
    }
}

/// Rolling wall-clock cost of simulation ticks.
#[derive(Debug)]
pub struct TickProfiler {
    started: Option<Instant>,
    samples: VecDeque<Duration>,
    max_samples: usize,
    slowest: Duration,
}

impl Default for TickProfiler {
    fn default() -> Self {
        Self::new(120)
    }
}

impl TickProfiler {
    /// Creates a profiler averaging the last `max_samples` ticks.
    #[must_use]
    pub fn new(max_samples: usize) -> Self {
        Self {
            started: None,
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
            slowest: Duration::ZERO,
        }
    }

    /// Marks the start of a tick.
    pub fn begin(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Marks the end of a tick.
    pub fn end(&mut self) {
        let Some(started) = self.started.take() else {
            return;
        };
        let elapsed = started.elapsed();
        self.slowest = self.slowest.max(elapsed);
        self.samples.push_back(elapsed);
        if self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Average tick time in milliseconds.
    #[must_use]
    pub fn average_ms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: Duration = self.samples.iter().sum();
        total.as_secs_f32() * 1000.0 / self.samples.len() as f32
    }

    /// Slowest tick in milliseconds.
    #[must_use]
    pub fn slowest_ms(&self) -> f32 {
        self.slowest.as_secs_f32() * 1000.0
    }

    /// Samples currently held.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}
