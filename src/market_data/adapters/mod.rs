// Shared trait + message types for venue adapters

use std::sync::Arc;
use std::time::Instant;

use url::Url;

use crate::config::{VenueKind, VenueSettings};
use crate::error::DecodeError;
use crate::market_data::types::{Quote, VenueId};

/// One inbound payload as it came off the socket.
#[derive(Debug, Clone, Copy)]
pub enum WireFrame<'a> {
    Text(&'a str),
    Binary(&'a [u8]),
}

/// What a decoded frame means to the connector.
#[derive(Debug, Clone, PartialEq)]
pub enum VenueMessage {
    Quote(Quote),
    /// Application-level keepalive; `reply` must be sent back verbatim.
    Heartbeat { reply: String },
    /// Subscription acks, pong echoes, venue error frames. Nothing to do.
    Control { detail: String },
}

/// Venue-specific protocol knowledge. Adapters are pure: all I/O lives in
/// the connector, so adding a venue means implementing this trait only.
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> &VenueId;

    fn endpoint(&self) -> &Url;

    /// Frames to send right after the socket opens. Empty when the venue
    /// subscribes implicitly through the connection path.
    fn subscribe_frames(&self) -> Vec<String>;

    fn decode(&self, frame: WireFrame<'_>, ingest_time: Instant) -> Result<VenueMessage, DecodeError>;
}

/// Builds the adapter for a validated venue entry.
pub fn build(venue: &VenueSettings, endpoint: Url, instrument: &str) -> Arc<dyn VenueAdapter> {
    let id = VenueId::new(&venue.id);
    match venue.kind {
        VenueKind::Binance => Arc::new(binance::BinanceAdapter::new(
            id,
            endpoint,
            instrument,
            venue.explicit_subscribe,
        )),
        VenueKind::Huobi => Arc::new(huobi::HuobiAdapter::new(id, endpoint, instrument)),
    }
}

pub mod binance;
pub mod binance_types;
pub mod huobi;
pub mod huobi_types;
