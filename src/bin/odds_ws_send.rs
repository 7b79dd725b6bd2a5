//! Smoke sender: pretends to be an extraction bridge talking to odds-hub.

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[tokio::main]
async fn main() -> Result<()> {
    let url = std::env::var("ODDS_HUB_URL").unwrap_or_else(|_| "ws://127.0.0.1:9988".to_string());
    let broker = std::env::var("ODDS_BROKER").unwrap_or_else(|_| "test".to_string());

    let (ws, _resp) = connect_async(&url)
        .await
        .with_context(|| format!("connect to {url}"))?;
    let (mut sink, mut stream) = ws.split();

    if let Some(Ok(Message::Text(t))) = stream.next().await {
        println!("welcome={}", t);
    }

    let frames = [
        json!({ "type": "handshake", "extension": "odds-ws-send", "version": 1 }),
        // 1) own broker
        json!({
            "type": "oddsUpdate",
            "brokerId": broker,
            "odds": ["2.10", "1.80"],
            "frozen": false,
            "map": 1,
            "timestamp": Utc::now().timestamp_millis()
        }),
        // 2) counterpart, crossing the first one
        json!({
            "type": "oddsUpdate",
            "broker": "other",
            "odds": ["1.70", 2.05],
            "frozen": 0
        }),
        // 3) flip own columns
        json!({ "type": "swapToggle", "broker": broker }),
        json!({ "type": "swapGet" }),
    ];

    for (i, frame) in frames.iter().enumerate() {
        sink.send(Message::Text(frame.to_string().into())).await?;
        if let Some(Ok(Message::Text(t))) = stream.next().await {
            println!("reply{}={}", i + 1, t);
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    Ok(())
}
