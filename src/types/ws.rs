use serde::{Deserialize, Serialize};

use super::PriceSource;

/// A price tick from the quote stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    /// Trade time (ms)
    pub timestamp: i64,
    pub source: PriceSource,
}

/// Connection state of the quote stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// Not started, or no symbols requested yet
    Idle,
    /// Live feed connected
    Connected,
    /// Feed down; simulated ticks are being generated
    Disconnected,
}

/// Event published by the stream client.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Tick(Tick),
    StatusChanged(StreamStatus),
}

/// Incoming WebSocket message from client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { symbols: Vec<String> },
    Unsubscribe { symbols: Vec<String> },
}

/// Outgoing WebSocket message to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    PriceUpdate { data: PriceUpdateData },
    StreamStatus { status: StreamStatus },
    Subscribed { symbols: Vec<String> },
    Unsubscribed { symbols: Vec<String> },
    Error { error: String },
}

/// Price update pushed to subscribed clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdateData {
    pub symbol: String,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_price: Option<f64>,
    pub timestamp: i64,
    pub source: PriceSource,
}
