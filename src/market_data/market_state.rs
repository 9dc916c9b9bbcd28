use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use itertools::{Itertools, MinMaxResult};
use parking_lot::RwLock;

use crate::engine::skew::ClockSkewEstimator;
use crate::market_data::types::{Quote, VenueId};

/// Point-in-time view of every venue's latest quote, sorted by venue.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub quotes: Vec<Arc<Quote>>,
}

impl MarketSnapshot {
    pub fn get(&self, venue: &VenueId) -> Option<&Arc<Quote>> {
        self.quotes.iter().find(|q| &q.venue == venue)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

// Shared venue -> latest quote map.
// Quotes are published as whole Arc values, so readers never see a torn record.
pub struct MarketStateStore {
    latest: RwLock<AHashMap<VenueId, Arc<Quote>>>,
    skew: Arc<ClockSkewEstimator>,
}

impl MarketStateStore {
    pub fn new(skew: Arc<ClockSkewEstimator>) -> Self {
        Self { latest: RwLock::new(AHashMap::new()), skew }
    }

    /// Unconditional last-write-wins for the quote's venue. Feeds the skew
    /// estimator when two or more venues are held.
    pub fn put(&self, quote: Quote) {
        let gap = {
            let mut latest = self.latest.write();
            latest.insert(quote.venue.clone(), Arc::new(quote));
            // newest minus oldest; a single venue yields no sample
            match latest.values().map(|q| q.ingest_time).minmax() {
                MinMaxResult::MinMax(oldest, newest) => Some(newest.saturating_duration_since(oldest)),
                MinMaxResult::NoElements | MinMaxResult::OneElement(_) => None,
            }
        };
        if let Some(gap) = gap {
            self.skew.record(gap);
        }
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        let mut quotes: Vec<Arc<Quote>> = self.latest.read().values().cloned().collect();
        quotes.sort_by(|a, b| a.venue.cmp(&b.venue));
        MarketSnapshot { quotes }
    }

    pub fn latest(&self, venue: &VenueId) -> Option<Arc<Quote>> {
        self.latest.read().get(venue).cloned()
    }

    pub fn is_fresh(&self, quote: &Quote, bound: Duration) -> bool {
        quote.is_fresh_at(bound, Instant::now())
    }

    pub fn dynamic_bound(&self) -> Duration {
        self.skew.dynamic_bound()
    }

    pub fn skew(&self) -> &ClockSkewEstimator {
        &self.skew
    }
}
