use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Venue identifier. Cheap to clone; every quote carries one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VenueId(Arc<str>);

impl VenueId {
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VenueId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl serde::Serialize for VenueId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

// Normalized best bid/ask from one venue.
// bid and ask are > 0 (enforced by the normaliser); bid > ask is allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub venue: VenueId,
    pub instrument: String,
    pub bid: Decimal,
    pub ask: Decimal,
    /// Venue-supplied event time, when the schema carries one.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Monotonic acceptance time; all freshness math uses this.
    pub ingest_time: Instant,
    /// Wall-clock acceptance time, for display only.
    pub received_at: DateTime<Utc>,
}

impl Quote {
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.ingest_time)
    }

    pub fn is_fresh_at(&self, bound: Duration, now: Instant) -> bool {
        self.age_at(now) < bound
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::quote_aged;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_freshness_is_strict() {
        let now = Instant::now();
        let q = quote_aged("a", dec!(1), dec!(2), now, Duration::from_millis(100));
        assert!(q.is_fresh_at(Duration::from_millis(101), now));
        assert!(!q.is_fresh_at(Duration::from_millis(100), now));
    }

    #[test]
    fn test_crossed_market_is_representable() {
        let now = Instant::now();
        let q = quote_aged("a", dec!(101), dec!(100), now, Duration::ZERO);
        assert!(q.bid > q.ask);
        assert!(q.is_fresh_at(Duration::from_secs(1), now));
    }

    #[test]
    fn test_venue_id_display() {
        assert_eq!(VenueId::new("binance").to_string(), "binance");
        assert_eq!(serde_json::to_string(&VenueId::new("huobi")).unwrap(), "\"huobi\"");
    }
}
