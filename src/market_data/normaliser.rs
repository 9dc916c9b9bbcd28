// Convert wire strings into validated decimal quotes.

use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::error::DecodeError;
use crate::market_data::types::{Quote, VenueId};

pub struct Normaliser {
    pub venue: VenueId,
    pub instrument: String, // canonical lower-case symbol, e.g. "ethusdt"
}

impl Normaliser {
    pub fn new(venue: VenueId, instrument: &str) -> Self {
        Self { venue, instrument: instrument.to_ascii_lowercase() }
    }

    /// Parses a price string and rejects anything that is not strictly positive.
    pub fn price(&self, field: &'static str, s: &str) -> Result<Decimal, DecodeError> {
        let invalid = || DecodeError::InvalidPrice { field, value: s.to_string() };
        let trimmed = s.trim();
        // Venues occasionally send exponent notation for small prices.
        let px = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| invalid())?;
        if px <= Decimal::ZERO {
            return Err(invalid());
        }
        Ok(px.normalize())
    }

    pub fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(ms).single()
    }

    pub fn quote(
        &self,
        bid: &str,
        ask: &str,
        source_timestamp: Option<DateTime<Utc>>,
        ingest_time: Instant,
    ) -> Result<Quote, DecodeError> {
        Ok(Quote {
            venue: self.venue.clone(),
            instrument: self.instrument.clone(),
            bid: self.price("bid", bid)?,
            ask: self.price("ask", ask)?,
            source_timestamp,
            ingest_time,
            received_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn norm() -> Normaliser {
        Normaliser::new(VenueId::new("binance"), "ETHUSDT")
    }

    #[test]
    fn test_price_parsing() {
        let n = norm();
        assert_eq!(n.price("bid", "1801.50000000").unwrap(), dec!(1801.5));
        assert_eq!(n.price("bid", " 3542.9 ").unwrap(), dec!(3542.9));
        assert_eq!(n.price("ask", "1e-5").unwrap(), dec!(0.00001));
    }

    #[test]
    fn test_non_positive_prices_are_rejected() {
        let n = norm();
        assert!(matches!(n.price("bid", "0"), Err(DecodeError::InvalidPrice { field: "bid", .. })));
        assert!(matches!(n.price("ask", "-1.2"), Err(DecodeError::InvalidPrice { field: "ask", .. })));
        assert!(n.price("ask", "abc").is_err());
        assert!(n.price("ask", "").is_err());
    }

    #[test]
    fn test_quote_uses_canonical_instrument() {
        let n = norm();
        let q = n.quote("1800.00", "1800.10", None, Instant::now()).unwrap();
        assert_eq!(q.instrument, "ethusdt");
        assert_eq!(q.venue.as_str(), "binance");
        assert_eq!(q.bid, dec!(1800));
    }
}
