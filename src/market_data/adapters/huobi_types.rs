// Source: Huobi/HTX market WebSocket (wss://api.huobi.pro/ws), frames are gzip'd json
use serde::Deserialize;
use serde_json::{Number, Value};

#[derive(Debug, Deserialize)]
pub struct Tick {
    pub bid: Value, // number on the wire, tolerated as string too
    pub ask: Value,
    #[serde(rename = "quoteTime", default)]
    pub quote_time: Option<i64>,
    #[serde(rename = "seqId", default)]
    pub seq_id: Option<u64>,
}

// Variant order matters: subbed acks carry `status` as well, so they
// must be tried before the error shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum HuobiMessage {
    Ping { ping: Number },
    Pong { pong: Number },
    Tick {
        ch: String,
        #[serde(default)]
        ts: Option<i64>,
        tick: Tick,
    },
    Subbed { subbed: String },
    Error {
        status: String,
        #[serde(rename = "err-code", default)]
        err_code: Option<String>,
        #[serde(rename = "err-msg")]
        err_msg: String,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct SubRequest {
    pub sub: String,
    pub id: String,
}

#[derive(Debug, serde::Serialize)]
pub struct PongReply<'a> {
    pub pong: &'a Number,
}

pub fn price_text(v: &Value) -> Option<String> {
    match v {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
