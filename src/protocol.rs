//! WS wire format between odds-hub and its clients (extraction bridges,
//! display surfaces). JSON objects tagged by `type`.

use odds_core::{HubSnapshot, RawSample};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Handshake {
        #[serde(default)]
        extension: Option<Value>,
        #[serde(default)]
        version:   Option<Value>,
    },
    OddsUpdate(RawSample),
    BrokerClosed {
        id: String,
    },
    BrokersSync {
        #[serde(default)]
        ids: Vec<String>,
    },
    SwapGet,
    SwapSet {
        broker:  String,
        #[serde(default)]
        swapped: bool,
    },
    SwapToggle {
        broker: String,
    },
    /// Start receiving snapshot pushes on this connection.
    Subscribe,
    Ping,
    Pong,
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Handshake { .. } => "handshake",
            ClientMessage::OddsUpdate(_) => "oddsUpdate",
            ClientMessage::BrokerClosed { .. } => "brokerClosed",
            ClientMessage::BrokersSync { .. } => "brokersSync",
            ClientMessage::SwapGet => "swapGet",
            ClientMessage::SwapSet { .. } => "swapSet",
            ClientMessage::SwapToggle { .. } => "swapToggle",
            ClientMessage::Subscribe => "subscribe",
            ClientMessage::Ping => "ping",
            ClientMessage::Pong => "pong",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage<'a> {
    Welcome { message: &'a str, timestamp: i64 },
    HandshakeAck { timestamp: i64 },
    Ack { ok: bool, note: &'a str },
    SwapList { brokers: &'a [String] },
    Snapshot(&'a HubSnapshot),
    Pong { timestamp: i64 },
}

pub fn encode(msg: &ServerMessage<'_>) -> String {
    serde_json::to_string(msg).unwrap_or_else(|_| "{}".to_string())
}
