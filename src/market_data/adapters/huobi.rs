// Venue B: gzip-compressed binary frames, `{ch, tick:{bid, ask}}` envelope,
// server-driven `{"ping":n}` keepalive.

use std::io::Read;
use std::time::Instant;

use flate2::read::GzDecoder;
use tracing::{debug, warn};
use url::Url;

use super::huobi_types::{price_text, HuobiMessage, PongReply, SubRequest, Tick};
use super::{VenueAdapter, VenueMessage, WireFrame};
use crate::error::DecodeError;
use crate::market_data::normaliser::Normaliser;
use crate::market_data::types::VenueId;

/// Upper bound on a decompressed frame; quote frames are a few hundred bytes.
pub const MAX_INFLATED_BYTES: usize = 1 << 20;

pub struct HuobiAdapter {
    pub endpoint: Url, // e.g. "wss://api.huobi.pro/ws"
    pub channels: [String; 2],
    normaliser: Normaliser,
}

impl HuobiAdapter {
    pub fn new(venue: VenueId, endpoint: Url, instrument: &str) -> Self {
        let normaliser = Normaliser::new(venue, instrument);
        let channels = [
            format!("market.{}.bbo", normaliser.instrument),
            format!("market.{}.ticker", normaliser.instrument),
        ];
        Self { endpoint, channels, normaliser }
    }

    fn gunzip(bytes: &[u8]) -> Result<String, DecodeError> {
        let mut out = Vec::new();
        // one byte past the limit tells "exactly at" from "over"
        GzDecoder::new(bytes)
            .take(MAX_INFLATED_BYTES as u64 + 1)
            .read_to_end(&mut out)
            .map_err(DecodeError::Decompress)?;
        if out.len() > MAX_INFLATED_BYTES {
            return Err(DecodeError::FrameTooLarge(MAX_INFLATED_BYTES));
        }
        Ok(String::from_utf8(out)?)
    }

    fn tick_to_message(
        &self,
        ch: String,
        ts: Option<i64>,
        tick: Tick,
        ingest_time: Instant,
    ) -> Result<VenueMessage, DecodeError> {
        if !self.channels.contains(&ch) {
            return Ok(VenueMessage::Control { detail: format!("ignoring channel {ch}") });
        }
        let bid = price_text(&tick.bid)
            .ok_or_else(|| DecodeError::InvalidPrice { field: "bid", value: tick.bid.to_string() })?;
        let ask = price_text(&tick.ask)
            .ok_or_else(|| DecodeError::InvalidPrice { field: "ask", value: tick.ask.to_string() })?;
        let source_ts = tick.quote_time.or(ts).and_then(Normaliser::millis_to_utc);
        let quote = self.normaliser.quote(&bid, &ask, source_ts, ingest_time)?;
        Ok(VenueMessage::Quote(quote))
    }
}

impl VenueAdapter for HuobiAdapter {
    fn venue(&self) -> &VenueId {
        &self.normaliser.venue
    }

    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn subscribe_frames(&self) -> Vec<String> {
        let req = SubRequest {
            sub: self.channels[0].clone(),
            id: format!("bbo-{}", chrono::Utc::now().timestamp_millis()),
        };
        match serde_json::to_string(&req) {
            Ok(frame) => vec![frame],
            Err(e) => {
                warn!(venue = %self.venue(), error = %e, "failed to encode sub request");
                Vec::new()
            }
        }
    }

    fn decode(&self, frame: WireFrame<'_>, ingest_time: Instant) -> Result<VenueMessage, DecodeError> {
        let text = match frame {
            WireFrame::Binary(bytes) => Self::gunzip(bytes)?,
            // Some gateways skip compression; the payload is the same json.
            WireFrame::Text(text) => text.to_string(),
        };

        match serde_json::from_str::<HuobiMessage>(&text)? {
            HuobiMessage::Ping { ping } => {
                let reply = serde_json::to_string(&PongReply { pong: &ping })?;
                Ok(VenueMessage::Heartbeat { reply })
            }
            HuobiMessage::Pong { pong } => Ok(VenueMessage::Control { detail: format!("pong {pong}") }),
            HuobiMessage::Tick { ch, ts, tick } => self.tick_to_message(ch, ts, tick, ingest_time),
            HuobiMessage::Subbed { subbed } => {
                debug!(venue = %self.venue(), %subbed, "subscription confirmed");
                Ok(VenueMessage::Control { detail: format!("subbed {subbed}") })
            }
            HuobiMessage::Error { status, err_code, err_msg } => {
                warn!(venue = %self.venue(), %status, code = ?err_code, msg = %err_msg, "venue error frame");
                Ok(VenueMessage::Control { detail: format!("{status}: {err_msg}") })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use rust_decimal_macros::dec;
    use std::io::Write;

    pub(crate) fn gzip(text: &str) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(text.as_bytes()).unwrap();
        enc.finish().unwrap()
    }

    fn adapter() -> HuobiAdapter {
        HuobiAdapter::new(VenueId::new("huobi"), Url::parse("wss://api.huobi.pro/ws").unwrap(), "ethusdt")
    }

    fn decode(text: &str) -> Result<VenueMessage, DecodeError> {
        adapter().decode(WireFrame::Binary(&gzip(text)), Instant::now())
    }

    #[test]
    fn test_bbo_tick() {
        let msg = decode(
            r#"{"ch":"market.ethusdt.bbo","ts":1630982325346,"tick":{"seqId":1,"ask":1800.0,"askSize":2.5,"bid":1799.8,"bidSize":1.0,"quoteTime":1630982325340,"symbol":"ethusdt"}}"#,
        )
        .unwrap();
        let VenueMessage::Quote(q) = msg else { panic!("expected quote") };
        assert_eq!(q.bid, dec!(1799.8));
        assert_eq!(q.ask, dec!(1800));
        assert_eq!(q.venue.as_str(), "huobi");
        assert_eq!(q.source_timestamp.unwrap().timestamp_millis(), 1_630_982_325_340);
    }

    #[test]
    fn test_ticker_channel_and_text_frames() {
        let text = r#"{"ch":"market.ethusdt.ticker","ts":1,"tick":{"bid":"1.25","ask":"1.5"}}"#;
        let msg = adapter().decode(WireFrame::Text(text), Instant::now()).unwrap();
        assert!(matches!(msg, VenueMessage::Quote(_)));
    }

    #[test]
    fn test_ping_is_echoed_verbatim() {
        let msg = decode(r#"{"ping":1492420473027}"#).unwrap();
        assert_eq!(msg, VenueMessage::Heartbeat { reply: r#"{"pong":1492420473027}"#.to_string() });
    }

    #[test]
    fn test_control_frames_are_ignored() {
        let subbed = decode(r#"{"id":"bbo-1","status":"ok","subbed":"market.ethusdt.bbo","ts":1489474081631}"#);
        assert!(matches!(subbed.unwrap(), VenueMessage::Control { .. }));
        let err = decode(r#"{"status":"error","err-code":"bad-request","err-msg":"invalid topic","ts":1}"#);
        assert!(matches!(err.unwrap(), VenueMessage::Control { .. }));
        let pong = decode(r#"{"pong":42}"#);
        assert!(matches!(pong.unwrap(), VenueMessage::Control { .. }));
        let other = decode(r#"{"ch":"market.btcusdt.bbo","tick":{"bid":1,"ask":2}}"#);
        assert!(matches!(other.unwrap(), VenueMessage::Control { .. }));
    }

    #[test]
    fn test_bad_frames_are_errors() {
        let garbage = adapter().decode(WireFrame::Binary(b"definitely not gzip"), Instant::now());
        assert!(matches!(garbage, Err(DecodeError::Decompress(_))));
        assert!(matches!(decode("{oops"), Err(DecodeError::Json(_))));
        assert!(matches!(
            decode(r#"{"ch":"market.ethusdt.bbo","tick":{"bid":-1,"ask":2}}"#),
            Err(DecodeError::InvalidPrice { field: "bid", .. })
        ));
        assert!(matches!(
            decode(r#"{"ch":"market.ethusdt.bbo","tick":{"bid":null,"ask":2}}"#),
            Err(DecodeError::InvalidPrice { field: "bid", .. })
        ));
    }

    #[test]
    fn test_inflated_size_is_bounded() {
        let padded = format!(r#"{{"ping":1,"pad":"{}"}}"#, " ".repeat(MAX_INFLATED_BYTES));
        let bomb = gzip(&padded);
        assert!(bomb.len() < 64 * 1024);
        let res = adapter().decode(WireFrame::Binary(&bomb), Instant::now());
        assert!(matches!(res, Err(DecodeError::FrameTooLarge(MAX_INFLATED_BYTES))));
    }

    #[test]
    fn test_subscribe_frame() {
        let frames = adapter().subscribe_frames();
        assert_eq!(frames.len(), 1);
        let v: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(v["sub"], "market.ethusdt.bbo");
        assert!(v["id"].as_str().unwrap().starts_with("bbo-"));
    }
}
