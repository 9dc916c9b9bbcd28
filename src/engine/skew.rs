//! Rolling estimate of inter-venue update skew.
//!
//! Each sample is the gap between the most and least recently updated venue
//! at the moment a quote is accepted. The derived bound tracks observed
//! jitter: `max(floor, mean * min(cap, base * (1 + stddev / (mean + 1))))`.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct SkewConfig {
    /// Number of samples kept (K).
    pub window: usize,
    pub multiplier_base: f64,
    pub multiplier_cap: f64,
    /// Lower limit for the bound, also the bound before any sample arrives.
    pub floor: Duration,
}

impl Default for SkewConfig {
    fn default() -> Self {
        Self {
            window: 50,
            multiplier_base: 1.5,
            multiplier_cap: 3.0,
            floor: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkewStats {
    pub samples: usize,
    pub mean_ms: f64,
    pub stddev_ms: f64,
    pub multiplier: f64,
    pub bound: Duration,
}

#[derive(Debug)]
struct Window {
    samples: VecDeque<f64>,
    stats: SkewStats,
}

#[derive(Debug)]
pub struct ClockSkewEstimator {
    config: SkewConfig,
    // append + evict + recompute happen under this one lock
    inner: Mutex<Window>,
}

impl ClockSkewEstimator {
    pub fn new(config: SkewConfig) -> Self {
        let window = config.window.max(1);
        let stats = SkewStats {
            samples: 0,
            mean_ms: 0.0,
            stddev_ms: 0.0,
            multiplier: config.multiplier_base,
            bound: config.floor,
        };
        Self {
            config,
            inner: Mutex::new(Window { samples: VecDeque::with_capacity(window), stats }),
        }
    }

    /// Records one gap sample and returns the recomputed bound.
    pub fn record(&self, gap: Duration) -> Duration {
        let gap_ms = gap.as_micros() as f64 / 1000.0;
        let capacity = self.config.window.max(1);

        let mut inner = self.inner.lock();
        inner.samples.push_back(gap_ms);
        while inner.samples.len() > capacity {
            inner.samples.pop_front();
        }
        inner.stats = self.compute(&inner.samples);
        trace!(gap_ms, bound_ms = inner.stats.bound.as_millis() as u64, "skew sample");
        inner.stats.bound
    }

    pub fn dynamic_bound(&self) -> Duration {
        self.inner.lock().stats.bound
    }

    pub fn stats(&self) -> SkewStats {
        self.inner.lock().stats
    }

    fn compute(&self, samples: &VecDeque<f64>) -> SkewStats {
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        let stddev = variance.sqrt();

        let multiplier = (self.config.multiplier_base * (1.0 + stddev / (mean + 1.0)))
            .min(self.config.multiplier_cap);
        let scaled = Duration::from_micros((mean * multiplier * 1000.0).round().max(0.0) as u64);

        SkewStats {
            samples: samples.len(),
            mean_ms: mean,
            stddev_ms: stddev,
            multiplier,
            bound: scaled.max(self.config.floor),
        }
    }
}
