//! Canonical per-broker record

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Price text meaning "unknown / unavailable".
pub const UNKNOWN_ODDS: &str = "-";

/// User's manually entered reference odds.
pub const EXCEL_BROKER: &str = "excel";
/// Internal data-aggregation service feed.
pub const DS_BROKER: &str = "ds";

/// Reference feeds: never arbitraged against, never pruned by a broker sync.
pub const RESERVED_BROKERS: [&str; 2] = [EXCEL_BROKER, DS_BROKER];

/// Latest sample for one broker. Odds stay as text; parsing happens at
/// consumption time because not every extraction path yields numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsRecord {
    pub broker: String,
    pub odds:   [String; 2],
    pub frozen: bool,
    /// Epoch millis of the last update.
    pub ts:     i64,
    /// Match segment (map 1/2/3…) the sample belongs to. Opaque here.
    pub map:    Option<i64>,
}

impl OddsRecord {
    pub fn new(broker: impl Into<String>, odds: [&str; 2], frozen: bool) -> Self {
        Self {
            broker: broker.into(),
            odds: [odds[0].to_string(), odds[1].to_string()],
            frozen,
            ts: Utc::now().timestamp_millis(),
            map: None,
        }
    }

    /// Row shown for a known broker that has not delivered any data yet.
    pub fn placeholder(broker: impl Into<String>) -> Self {
        Self::new(broker, [UNKNOWN_ODDS, UNKNOWN_ODDS], true)
    }

    pub fn with_map(mut self, map: Option<i64>) -> Self {
        self.map = map;
        self
    }

    pub fn with_ts(mut self, ts: i64) -> Self {
        self.ts = ts;
        self
    }

    /// Both sides as prices, or `None` if either is not a usable number.
    pub fn parsed_odds(&self) -> Option<[f64; 2]> {
        Some([parse_price(&self.odds[0])?, parse_price(&self.odds[1])?])
    }

    /// Not frozen and both sides numeric.
    pub fn is_live(&self) -> bool {
        !self.frozen && self.parsed_odds().is_some()
    }

    /// Copy with the two sides exchanged.
    pub fn swapped(&self) -> Self {
        let mut out = self.clone();
        out.odds.swap(0, 1);
        out
    }
}

/// Decimal odds are finite and strictly positive; anything else is unknown.
pub fn parse_price(text: &str) -> Option<f64> {
    let value = text.trim().parse::<f64>().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}

pub fn default_excluded() -> HashSet<String> {
    RESERVED_BROKERS.iter().map(|b| b.to_string()).collect()
}
