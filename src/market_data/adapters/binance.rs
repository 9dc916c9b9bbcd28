// Venue A: plain text frames, flat best bid/ask objects.

use std::time::Instant;

use tracing::{debug, warn};
use url::Url;

use super::binance_types::{BinanceMessage, BookTicker, SubscribeRequest};
use super::{VenueAdapter, VenueMessage, WireFrame};
use crate::error::DecodeError;
use crate::market_data::normaliser::Normaliser;
use crate::market_data::types::VenueId;

pub struct BinanceAdapter {
    pub endpoint: Url,          // e.g. "wss://stream.binance.com:9443/ws"
    pub stream: String,         // e.g. "ethusdt@bookTicker"
    pub explicit_subscribe: bool,
    normaliser: Normaliser,
}

impl BinanceAdapter {
    pub fn new(venue: VenueId, endpoint: Url, instrument: &str, explicit_subscribe: bool) -> Self {
        let normaliser = Normaliser::new(venue, instrument);
        Self {
            endpoint,
            stream: format!("{}@bookTicker", normaliser.instrument),
            explicit_subscribe,
            normaliser,
        }
    }

    fn ticker_to_message(&self, ticker: BookTicker, ingest_time: Instant) -> Result<VenueMessage, DecodeError> {
        if !ticker.symbol.eq_ignore_ascii_case(&self.normaliser.instrument) {
            return Ok(VenueMessage::Control {
                detail: format!("ignoring quote for {}", ticker.symbol),
            });
        }
        let source_ts = ticker.event_time.and_then(Normaliser::millis_to_utc);
        let quote = self.normaliser.quote(&ticker.bid, &ticker.ask, source_ts, ingest_time)?;
        Ok(VenueMessage::Quote(quote))
    }
}

impl VenueAdapter for BinanceAdapter {
    fn venue(&self) -> &VenueId {
        &self.normaliser.venue
    }

    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn subscribe_frames(&self) -> Vec<String> {
        if !self.explicit_subscribe {
            return Vec::new();
        }
        let req = SubscribeRequest {
            method: "SUBSCRIBE",
            params: vec![self.stream.clone()],
            id: 1,
        };
        match serde_json::to_string(&req) {
            Ok(frame) => vec![frame],
            Err(e) => {
                warn!(venue = %self.venue(), error = %e, "failed to encode subscribe request");
                Vec::new()
            }
        }
    }

    fn decode(&self, frame: WireFrame<'_>, ingest_time: Instant) -> Result<VenueMessage, DecodeError> {
        let text = match frame {
            WireFrame::Text(text) => text,
            WireFrame::Binary(_) => return Err(DecodeError::UnexpectedFraming("binary")),
        };

        match serde_json::from_str::<BinanceMessage>(text)? {
            BinanceMessage::Combined { stream, data } => {
                debug!(venue = %self.venue(), %stream, "combined stream payload");
                self.ticker_to_message(data, ingest_time)
            }
            BinanceMessage::Ticker(ticker) => self.ticker_to_message(ticker, ingest_time),
            BinanceMessage::Error { error } | BinanceMessage::Status(error) => {
                warn!(venue = %self.venue(), code = error.code, msg = %error.msg, "venue error frame");
                Ok(VenueMessage::Control { detail: format!("error {}: {}", error.code, error.msg) })
            }
            BinanceMessage::Ack { id } => Ok(VenueMessage::Control { detail: format!("ack {id}") }),
        }
    }
}
