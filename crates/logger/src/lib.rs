/// OddsMoni Logger
/// JSONL event stream, one file per UTC day

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        fs::create_dir_all(&dir).ok();
        Self { log_dir: dir }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Path of today's file.
    pub fn current_path(&self) -> PathBuf {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        self.log_dir.join(format!("{date}.jsonl"))
    }

    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let path  = self.current_path();
        let line  = serde_json::to_string(event)?;
        let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Event types ──────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct OddsIngestEvent {
    pub ts:       String,
    pub event:    &'static str,   // "FEED_INGEST"
    pub peer:     String,
    pub msg_type: String,
    pub ok:       bool,
    pub note:     String,
}

#[derive(Serialize, Debug)]
pub struct ArbOpportunityEvent {
    pub ts:             String,
    pub event:          &'static str,   // "ARB_OPPORTUNITY" | "ARB_CHANGED"
    pub profit_pct:     f64,
    pub overround:      f64,
    pub side1_broker:   String,
    pub side1_odds:     f64,
    pub side2_broker:   String,
    pub side2_odds:     f64,
    pub mid:            Option<[f64; 2]>,
    pub action:         &'static str,   // always "OBSERVE"
}

#[derive(Serialize, Debug)]
pub struct ArbClosedEvent {
    pub ts:              String,
    pub event:           &'static str,  // "ARB_CLOSED"
    pub last_profit_pct: f64,
    pub open_secs:       i64,
}

#[derive(Serialize, Debug)]
pub struct SwapChangedEvent {
    pub ts:      String,
    pub event:   &'static str,          // "SWAP_CHANGED"
    pub broker:  String,
    pub swapped: bool,
    pub list:    Vec<String>,
}

#[derive(Serialize, Debug)]
pub struct BrokerRemovedEvent {
    pub ts:     String,
    pub event:  &'static str,           // "BROKER_REMOVED"
    pub broker: String,
    pub reason: &'static str,           // "closed" | "disconnect"
}

#[derive(Serialize, Debug)]
pub struct HubHeartbeatEvent {
    pub ts:           String,
    pub event:        &'static str,     // "ODDS_HUB_HEARTBEAT"
    pub connections:  usize,
    pub records:      usize,
    pub live_records: usize,
    pub stale:        usize,
    pub arb_open:     bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_json_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let logger = EventLogger::new(dir.path().join("nested"));

        for broker in ["a", "b"] {
            logger
                .log(&BrokerRemovedEvent {
                    ts: now_iso(),
                    event: "BROKER_REMOVED",
                    broker: broker.to_string(),
                    reason: "closed",
                })
                .unwrap();
        }

        let text = fs::read_to_string(logger.current_path()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["broker"], "b");
        assert_eq!(lines[0]["event"], "BROKER_REMOVED");
    }
}
