use std::time::Duration;

use thiserror::Error;

use crate::market_data::types::VenueId;

/// Transport-level failures. All of them are recovered by the connector's
/// reconnect loop; none escape past it.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connect did not complete within {0:?}")]
    ConnectTimeout(Duration),

    #[error("no inbound traffic for {0:?}")]
    HeartbeatTimeout(Duration),

    #[error("connection closed by remote: {reason}")]
    ClosedByRemote { reason: String },

    #[error("stream ended without a close frame")]
    StreamEnded,
}

/// A single inbound frame could not be turned into anything useful.
/// The frame is dropped; the connection stays up.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("gzip decompression failed: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("payload is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid {field} price {value:?}")]
    InvalidPrice { field: &'static str, value: String },

    #[error("decompressed frame exceeds {0} bytes")]
    FrameTooLarge(usize),

    #[error("unexpected {0} frame")]
    UnexpectedFraming(&'static str),
}

/// Why a venue pair was not compared in a detection pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StaleDataError {
    #[error("quote from {venue} is {age:?} old (limit {limit:?})")]
    Expired {
        venue: VenueId,
        age: Duration,
        limit: Duration,
    },

    #[error("{first} and {second} are {gap:?} apart (dynamic bound {bound:?})")]
    Skewed {
        first: VenueId,
        second: VenueId,
        gap: Duration,
        bound: Duration,
    },
}

/// Startup-only failures. The process refuses to start connectors when any
/// of these is returned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("venue {venue}: invalid url {url:?}: {source}")]
    InvalidVenueUri {
        venue: String,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("venue {venue}: unsupported url scheme {scheme:?} (expected ws or wss)")]
    UnsupportedScheme { venue: String, scheme: String },

    #[error("invalid margin threshold {0:?}: must be a finite, non-negative percent")]
    InvalidThreshold(String),

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("no venues configured")]
    NoVenues,

    #[error("venue {0} configured more than once")]
    DuplicateVenue(String),
}
