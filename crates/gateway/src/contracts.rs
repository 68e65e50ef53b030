//! Wire contracts and the capability traits that stitch the fan-out fabric
//! together.
//!
//! SymbolManager and PubSubClient reference each other (subscribe flows
//! down, broadcasts flow back up). The cycle is broken by two narrow
//! traits — [`StreamUplink`] and [`RemoteBroadcaster`] — wired after both
//! sides are constructed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use thiserror::Error;

/// Client control verb on `/ws/marketData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Method {
    #[serde(rename = "SUBSCRIBE")]
    Subscribe,
    #[serde(rename = "UNSUBSCRIBE")]
    Unsubscribe,
}

/// Inbound control frame: `{"method":"SUBSCRIBE","params":["btcusdt@depth"],"id":1}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientCommand {
    pub method: Method,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub id: i64,
}

/// A market-data message as published on the bus and pushed to clients:
/// `{"stream":"<name>","data":<any>}`. The payload stays opaque for
/// routing; subscribers decode it into the typed shapes below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEnvelope {
    pub stream: String,
    pub data: Box<RawValue>,
}

/// Downstream capability of the pub/sub client, as seen by the
/// SymbolManager. Calls may perform broker I/O; the SymbolManager invokes
/// them from spawned tasks so a caller is never blocked on the broker.
#[async_trait]
pub trait StreamUplink: Send + Sync {
    async fn subscribe_stream(&self, stream: &str);
    async fn unsubscribe_stream(&self, stream: &str);
}

/// Upstream capability of the fan-out side, as seen by the pub/sub client.
#[async_trait]
pub trait RemoteBroadcaster: Send + Sync {
    async fn broadcast_from_remote(&self, envelope: StreamEnvelope);
}

/// Transport sink for one client connection; a websocket text sink in
/// production. Writes on one sink are serialized by the caller.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, frame: &str) -> Result<(), SinkError>;
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("peer closed")]
    Closed,
    #[error("transport: {0}")]
    Transport(String),
}

// ---------------------------------------------------------------------
// Typed market-data payloads
// ---------------------------------------------------------------------
//
// Shapes for the `data` member of a StreamEnvelope, using the feed's
// single-letter wire names. Producers may omit fields; everything beyond
// the event tag defaults.

/// Incremental depth update (`<symbol>@depth`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthData {
    #[serde(rename = "e")]
    pub event: String,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "E", default)]
    pub event_time: i64,
    #[serde(rename = "T", default)]
    pub trade_time: i64,
    #[serde(rename = "U", default)]
    pub first_id: i64,
    #[serde(rename = "u", default)]
    pub last_id: i64,
    #[serde(rename = "b", default)]
    pub bids: Vec<[String; 2]>,
    #[serde(rename = "a", default)]
    pub asks: Vec<[String; 2]>,
}

/// Best bid/ask update (`<symbol>@bookTicker`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookTickerData {
    #[serde(rename = "e")]
    pub event: String,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "E", default)]
    pub event_time: i64,
    #[serde(rename = "T", default)]
    pub trade_time: i64,
    #[serde(rename = "b", default)]
    pub best_bid: String,
    #[serde(rename = "B", default)]
    pub best_bid_qty: String,
    #[serde(rename = "a", default)]
    pub best_ask: String,
    #[serde(rename = "A", default)]
    pub best_ask_qty: String,
    #[serde(rename = "u", default)]
    pub update_id: i64,
}

/// Single execution (`<symbol>@trade`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeData {
    #[serde(rename = "e")]
    pub event: String,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "E", default)]
    pub event_time: i64,
    #[serde(rename = "T", default)]
    pub trade_time: i64,
    #[serde(rename = "t", default)]
    pub trade_id: i64,
    #[serde(rename = "p", default)]
    pub price: String,
    #[serde(rename = "q", default)]
    pub quantity: String,
    #[serde(rename = "a", default)]
    pub buyer_order_id: String,
    #[serde(rename = "b", default)]
    pub seller_order_id: String,
    #[serde(rename = "m", default)]
    pub is_buyer_maker: bool,
}

/// Last-price tick (`<symbol>@ticker`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerData {
    #[serde(rename = "e")]
    pub event: String,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "E", default)]
    pub event_time: i64,
    #[serde(rename = "p", default)]
    pub price: String,
}
