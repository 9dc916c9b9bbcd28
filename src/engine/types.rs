use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::market_data::types::VenueId;

// Detected cross-venue discrepancy: buy at buy_venue's ask, sell at sell_venue's bid.
// Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbitrageOpportunity {
    pub instrument: String,
    pub buy_venue: VenueId,
    pub sell_venue: VenueId,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    /// Already scaled by 100: 0.08 means 0.08 %.
    pub margin_percent: Decimal,
    pub detected_at: DateTime<Utc>,
}

impl ArbitrageOpportunity {
    pub fn price_difference(&self) -> Decimal {
        self.sell_price - self.buy_price
    }
}

impl fmt::Display for ArbitrageOpportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} buy {} @ {} / sell {} @ {} (diff {}, margin {}%)",
            self.instrument,
            self.buy_venue,
            self.buy_price,
            self.sell_venue,
            self.sell_price,
            self.price_difference(),
            self.margin_percent.round_dp(4)
        )
    }
}
