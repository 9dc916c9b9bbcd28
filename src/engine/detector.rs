use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use itertools::Itertools;
use rust_decimal::{Decimal, RoundingStrategy};
use smallvec::SmallVec;
use tracing::{debug, instrument, trace};

use crate::engine::stats::Statistics;
use crate::engine::types::ArbitrageOpportunity;
use crate::error::StaleDataError;
use crate::market_data::market_state::MarketSnapshot;
use crate::market_data::types::Quote;

/// Scale of the raw ratio before it is turned into a percent.
const MARGIN_SCALE: u32 = 6;

pub type Opportunities = SmallVec<[ArbitrageOpportunity; 2]>;

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Percent, not a fraction: 0.03 means 0.03 %.
    pub threshold_percent: Decimal,
    /// Hard ceiling on quote age, independent of the dynamic bound.
    pub absolute_expiry: Duration,
}

/// `round_half_up((bid_y - ask_x) / ask_x, 6) * 100`. `None` when `ask_x` is
/// zero or the result does not fit in a `Decimal`.
pub fn margin_percent(ask_x: Decimal, bid_y: Decimal) -> Option<Decimal> {
    let ratio = (bid_y - ask_x).checked_div(ask_x)?;
    ratio
        .round_dp_with_strategy(MARGIN_SCALE, RoundingStrategy::MidpointAwayFromZero)
        .checked_mul(Decimal::ONE_HUNDRED)
}

pub struct ArbitrageDetector {
    config: DetectorConfig,
    stats: Arc<Statistics>,
}

impl ArbitrageDetector {
    pub fn new(config: DetectorConfig, stats: Arc<Statistics>) -> Self {
        Self { config, stats }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// One detection pass over every ordered venue pair.
    ///
    /// Output depends only on the snapshot, the bound and `now`; calling it
    /// twice with the same inputs yields the same opportunities (up to
    /// `detected_at`). Counters: one check per pass with two or more venues,
    /// at most one stale skip per pass, one per emitted opportunity.
    #[instrument(level = "trace", skip_all, fields(venues = snapshot.len()))]
    pub fn check(&self, snapshot: &MarketSnapshot, dynamic_bound: Duration, now: Instant) -> Opportunities {
        let mut found = Opportunities::new();
        if snapshot.len() < 2 {
            return found;
        }
        let started = Instant::now();
        self.stats.record_check();

        let mut skipped_for_staleness = false;
        for pair in snapshot.quotes.iter().permutations(2) {
            let (buy, sell) = (pair[0], pair[1]);
            if let Err(stale) = self.comparable(buy, sell, dynamic_bound, now) {
                debug!(reason = %stale, "pair skipped");
                skipped_for_staleness = true;
                continue;
            }
            if let Some(opportunity) = self.evaluate(buy, sell) {
                found.push(opportunity);
            }
        }

        if skipped_for_staleness {
            self.stats.record_stale_skip();
        }
        for _ in &found {
            self.stats.record_opportunity();
        }
        self.stats.record_check_latency(started.elapsed());
        found
    }

    fn comparable(&self, x: &Quote, y: &Quote, dynamic_bound: Duration, now: Instant) -> Result<(), StaleDataError> {
        for q in [x, y] {
            if !q.is_fresh_at(self.config.absolute_expiry, now) {
                return Err(StaleDataError::Expired {
                    venue: q.venue.clone(),
                    age: q.age_at(now),
                    limit: self.config.absolute_expiry,
                });
            }
        }
        let gap = if x.ingest_time >= y.ingest_time {
            x.ingest_time - y.ingest_time
        } else {
            y.ingest_time - x.ingest_time
        };
        if gap >= dynamic_bound {
            return Err(StaleDataError::Skewed {
                first: x.venue.clone(),
                second: y.venue.clone(),
                gap,
                bound: dynamic_bound,
            });
        }
        Ok(())
    }

    // Buy at x's ask, sell at y's bid.
    fn evaluate(&self, x: &Quote, y: &Quote) -> Option<ArbitrageOpportunity> {
        let margin = margin_percent(x.ask, y.bid)?;
        trace!(buy = %x.venue, sell = %y.venue, %margin, "margin");
        if margin <= self.config.threshold_percent {
            return None;
        }
        Some(ArbitrageOpportunity {
            instrument: x.instrument.clone(),
            buy_venue: x.venue.clone(),
            sell_venue: y.venue.clone(),
            buy_price: x.ask,
            sell_price: y.bid,
            margin_percent: margin,
            detected_at: Utc::now(),
        })
    }
}
