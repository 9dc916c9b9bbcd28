// Source: Binance spot WebSocket streams (<symbol>@bookTicker, <symbol>@ticker)
use serde::Deserialize;

/// Flat best bid/ask payload. Both the bookTicker and the 24h ticker stream
/// carry `s`, `b` and `a`; only the ticker carries the event time `E`.
#[derive(Debug, Deserialize)]
pub struct BookTicker {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b")]
    pub bid: String,
    #[serde(rename = "a")]
    pub ask: String,
    #[serde(rename = "B", default)]
    pub bid_qty: Option<String>,
    #[serde(rename = "A", default)]
    pub ask_qty: Option<String>,
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    #[serde(rename = "u", default)]
    pub update_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub code: i64,
    pub msg: String,
}

// Variant order matters: serde tries them top to bottom.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum BinanceMessage {
    /// `/stream?streams=` endpoints wrap every payload.
    Combined { stream: String, data: BookTicker },
    Ticker(BookTicker),
    Error { error: ApiError },
    Status(ApiError),
    /// Reply to SUBSCRIBE: `{"result":null,"id":1}`
    Ack { id: serde_json::Value },
}

#[derive(Debug, serde::Serialize)]
pub struct SubscribeRequest {
    pub method: &'static str,
    pub params: Vec<String>,
    pub id: u64,
}
