//! Process-lifetime counters and the periodic summary task.
//!
//! Counters only ever increase. The reporter moves the "last emitted" marker
//! and nothing else, so every summary shows cumulative totals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub checks: u64,
    pub stale_skips: u64,
    pub opportunities: u64,
    pub quotes: u64,
    pub decode_errors: u64,
    pub reconnects: u64,
    pub connector_failures: u64,
    pub check_p50_us: u64,
    pub check_p99_us: u64,
}

pub struct Statistics {
    checks: AtomicU64,
    stale_skips: AtomicU64,
    opportunities: AtomicU64,
    quotes: AtomicU64,
    decode_errors: AtomicU64,
    reconnects: AtomicU64,
    connector_failures: AtomicU64,
    check_latency_us: Mutex<Option<Histogram<u64>>>,
    last_emitted_at: Mutex<Option<DateTime<Utc>>>,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    pub fn new() -> Self {
        // 1us .. 10s, 3 significant figures
        let histogram = Histogram::new_with_bounds(1, 10_000_000, 3).ok();
        Self {
            checks: AtomicU64::new(0),
            stale_skips: AtomicU64::new(0),
            opportunities: AtomicU64::new(0),
            quotes: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            connector_failures: AtomicU64::new(0),
            check_latency_us: Mutex::new(histogram),
            last_emitted_at: Mutex::new(None),
        }
    }

    pub fn record_check(&self) {
        self.checks.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("arbx_checks_total").increment(1);
    }

    pub fn record_stale_skip(&self) {
        self.stale_skips.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("arbx_stale_skips_total").increment(1);
    }

    pub fn record_opportunity(&self) {
        self.opportunities.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("arbx_opportunities_total").increment(1);
    }

    pub fn record_quote(&self) {
        self.quotes.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("arbx_quotes_total").increment(1);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("arbx_decode_errors_total").increment(1);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("arbx_reconnects_total").increment(1);
    }

    /// A connector task died outside its own reconnect loop.
    pub fn record_connector_failure(&self) {
        self.connector_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("arbx_connector_failures_total").increment(1);
    }

    pub fn record_check_latency(&self, elapsed: Duration) {
        let micros = (elapsed.as_micros() as u64).clamp(1, 10_000_000);
        if let Some(h) = self.check_latency_us.lock().as_mut() {
            // value is clamped into the histogram's range
            let _ = h.record(micros);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let (p50, p99) = match self.check_latency_us.lock().as_ref() {
            Some(h) if !h.is_empty() => (h.value_at_quantile(0.50), h.value_at_quantile(0.99)),
            _ => (0, 0),
        };
        StatsSnapshot {
            checks: self.checks.load(Ordering::Relaxed),
            stale_skips: self.stale_skips.load(Ordering::Relaxed),
            opportunities: self.opportunities.load(Ordering::Relaxed),
            quotes: self.quotes.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            connector_failures: self.connector_failures.load(Ordering::Relaxed),
            check_p50_us: p50,
            check_p99_us: p99,
        }
    }

    pub fn last_emitted_at(&self) -> Option<DateTime<Utc>> {
        *self.last_emitted_at.lock()
    }

    /// Logs a summary and moves the emission marker. Counters are untouched.
    pub fn emit(&self, connection_status: &str) -> StatsSnapshot {
        let snap = self.snapshot();
        *self.last_emitted_at.lock() = Some(Utc::now());
        info!(
            checks = snap.checks,
            stale_skips = snap.stale_skips,
            opportunities = snap.opportunities,
            quotes = snap.quotes,
            decode_errors = snap.decode_errors,
            reconnects = snap.reconnects,
            connector_failures = snap.connector_failures,
            check_p50_us = snap.check_p50_us,
            check_p99_us = snap.check_p99_us,
            connections = connection_status,
            "statistics"
        );
        snap
    }
}

/// Periodic summary task. Emits every `interval`, and once more on shutdown.
pub struct StatisticsReporter {
    stats: Arc<Statistics>,
    interval: Duration,
    status: Arc<dyn Fn() -> String + Send + Sync>,
}

impl StatisticsReporter {
    pub fn new(stats: Arc<Statistics>, interval: Duration, status: Arc<dyn Fn() -> String + Send + Sync>) -> Self {
        Self { stats, interval, status }
    }

    pub async fn run(self, cancel: CancellationToken) -> StatsSnapshot {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.stats.emit(&(self.status)());
                }
            }
        }

        let last = self.stats.emit(&(self.status)());
        if last.checks == 0 && last.quotes > 0 {
            warn!("quotes were received but no venue pair was ever comparable");
        }
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_cumulative_across_emissions() {
        let stats = Statistics::new();
        stats.record_check();
        stats.record_check();
        stats.record_stale_skip();
        stats.record_opportunity();

        let first = stats.emit("1/1");
        assert_eq!(first.checks, 2);
        assert!(stats.last_emitted_at().is_some());

        stats.record_check();
        let second = stats.emit("1/1");
        assert_eq!(second.checks, 3);
        assert_eq!(second.stale_skips, 1);
        assert_eq!(second.opportunities, 1);
    }

    #[test]
    fn test_concurrent_increments() {
        let stats = Statistics::new();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1_000 {
                        stats.record_check();
                        stats.record_quote();
                    }
                });
            }
        });
        let snap = stats.snapshot();
        assert_eq!(snap.checks, 8_000);
        assert_eq!(snap.quotes, 8_000);
    }

    #[test]
    fn test_latency_quantiles() {
        let stats = Statistics::new();
        assert_eq!(stats.snapshot().check_p99_us, 0);
        for us in 1..=100u64 {
            stats.record_check_latency(Duration::from_micros(us));
        }
        let snap = stats.snapshot();
        assert!(snap.check_p50_us >= 49 && snap.check_p50_us <= 51);
        assert!(snap.check_p99_us >= 98);
    }

    #[tokio::test]
    async fn test_reporter_emits_final_summary_on_shutdown() {
        let stats = Arc::new(Statistics::new());
        stats.record_check();
        let reporter = StatisticsReporter::new(
            stats.clone(),
            Duration::from_millis(20),
            Arc::new(|| "0/2".to_string()),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(reporter.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(70)).await;
        let periodic_mark = stats.last_emitted_at();
        assert!(periodic_mark.is_some(), "periodic emission should have happened");

        cancel.cancel();
        let last = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reporter should stop")
            .expect("task should not panic");
        assert_eq!(last.checks, 1);
        assert!(stats.last_emitted_at() >= periodic_mark);
    }
}
