//! Sample normalizer
//!
//! Extraction sources are not trusted to send well-typed payloads. Every field
//! is read as a loose JSON value and coerced with explicit defaults; anything
//! that is not a known field is dropped here.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{OddsRecord, UNKNOWN_ODDS};

/// Raw odds payload as delivered by a transport.
///
/// The broker key may arrive as `broker`, `brokerId` or `id` (bridges spread
/// their own fields over the sample), so each spelling is its own field and
/// [`normalize`] picks the first usable one in that order. Same for `ts`
/// over `timestamp`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    #[serde(default)]
    pub broker:    Option<Value>,
    #[serde(default, rename = "brokerId", skip_serializing_if = "Option::is_none")]
    pub broker_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id:        Option<Value>,
    #[serde(default)]
    pub odds:      Option<Value>,
    #[serde(default)]
    pub frozen:    Option<Value>,
    #[serde(default)]
    pub map:       Option<Value>,
    #[serde(default)]
    pub ts:        Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed:   Option<Value>,
}

impl RawSample {
    pub fn new(broker: &str, odds: [&str; 2], frozen: bool) -> Self {
        Self {
            broker: Some(Value::from(broker)),
            odds: Some(Value::from(vec![odds[0], odds[1]])),
            frozen: Some(Value::Bool(frozen)),
            ..Self::default()
        }
    }

    /// Close signal riding on the odds channel.
    pub fn removal(broker: &str) -> Self {
        Self {
            broker: Some(Value::from(broker)),
            removed: Some(Value::Bool(true)),
            ..Self::default()
        }
    }

    /// Lenient parse of an arbitrary JSON value; non-objects yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        // derive would also accept a positional array
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

impl From<&OddsRecord> for RawSample {
    fn from(rec: &OddsRecord) -> Self {
        Self {
            broker: Some(Value::from(rec.broker.as_str())),
            odds: Some(Value::from(vec![rec.odds[0].as_str(), rec.odds[1].as_str()])),
            frozen: Some(Value::Bool(rec.frozen)),
            map: rec.map.map(Value::from),
            ts: Some(Value::from(rec.ts)),
            ..Self::default()
        }
    }
}

/// What a raw sample asks the registry to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    Upsert(OddsRecord),
    Remove(String),
}

/// Coerce a raw payload into a record, stamping missing timestamps with the
/// receive time.
pub fn normalize(raw: &RawSample) -> Option<OddsRecord> {
    normalize_at(raw, Utc::now().timestamp_millis())
}

/// Same as [`normalize`] with an explicit receive time.
pub fn normalize_at(raw: &RawSample, now_ms: i64) -> Option<OddsRecord> {
    let broker = broker_id(raw)?;

    let odds = match raw.odds.as_ref() {
        Some(Value::Array(items)) if items.len() >= 2 => {
            [coerce_side(&items[0]), coerce_side(&items[1])]
        }
        _ => [UNKNOWN_ODDS.to_string(), UNKNOWN_ODDS.to_string()],
    };

    Some(OddsRecord {
        broker,
        odds,
        frozen: raw.frozen.as_ref().map_or(false, truthy),
        ts: [&raw.ts, &raw.timestamp]
            .into_iter()
            .find_map(|v| v.as_ref().and_then(epoch_ms))
            .unwrap_or(now_ms),
        map: raw.map.as_ref().and_then(integer),
    })
}

/// Upsert or removal; `None` when the sample carries no usable broker.
pub fn classify(raw: &RawSample) -> Option<Ingest> {
    if raw.removed.as_ref().map_or(false, truthy) {
        return broker_id(raw).map(Ingest::Remove);
    }
    normalize(raw).map(Ingest::Upsert)
}

fn broker_id(raw: &RawSample) -> Option<String> {
    [&raw.broker, &raw.broker_id, &raw.id]
        .into_iter()
        .find_map(|v| match v.as_ref()? {
            Value::String(s) => {
                let id = s.trim();
                (!id.is_empty()).then(|| id.to_string())
            }
            _ => None,
        })
}

fn coerce_side(value: &Value) -> String {
    match value {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => UNKNOWN_ODDS.to_string(),
    }
}

/// JavaScript `!!value`.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn integer(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    let f = value.as_f64()?;
    (f.is_finite() && f.fract() == 0.0).then(|| f as i64)
}

fn epoch_ms(value: &Value) -> Option<i64> {
    let f = value.as_f64()?;
    f.is_finite().then(|| f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(v: Value) -> RawSample {
        RawSample::from_value(&v).expect("object payload")
    }

    #[test]
    fn well_formed_sample_passes_through() {
        let rec = normalize_at(
            &raw(json!({"broker": "pinnacle", "odds": ["1.85", "2.05"], "frozen": false, "map": 2, "ts": 1_700_000_000_000_i64})),
            5,
        )
        .unwrap();
        assert_eq!(rec.broker, "pinnacle");
        assert_eq!(rec.odds, ["1.85".to_string(), "2.05".to_string()]);
        assert!(!rec.frozen);
        assert_eq!(rec.map, Some(2));
        assert_eq!(rec.ts, 1_700_000_000_000);
    }

    #[test]
    fn missing_or_short_odds_become_unknown() {
        for odds in [json!(null), json!("2.0"), json!(["2.0"]), json!({"a": 1})] {
            let rec = normalize_at(&raw(json!({"broker": "b", "odds": odds})), 0).unwrap();
            assert_eq!(rec.odds, ["-".to_string(), "-".to_string()]);
            assert!(!rec.frozen);
        }
        let rec = normalize_at(&raw(json!({"broker": "b"})), 0).unwrap();
        assert_eq!(rec.odds, ["-".to_string(), "-".to_string()]);
    }

    #[test]
    fn odds_elements_are_coerced_to_text() {
        let rec = normalize_at(&raw(json!({"broker": "b", "odds": [1.95, " 2.1 ", null, "x"]})), 0).unwrap();
        assert_eq!(rec.odds, ["1.95".to_string(), "2.1".to_string()]);

        let rec = normalize_at(&raw(json!({"broker": "b", "odds": [true, ""]})), 0).unwrap();
        assert_eq!(rec.odds, ["-".to_string(), "-".to_string()]);
    }

    #[test]
    fn empty_or_non_string_broker_is_rejected() {
        assert!(normalize_at(&raw(json!({"odds": ["1", "2"]})), 0).is_none());
        assert!(normalize_at(&raw(json!({"broker": "   "})), 0).is_none());
        assert!(normalize_at(&raw(json!({"broker": 42})), 0).is_none());
        assert!(RawSample::from_value(&json!(["not", "an", "object"])).is_none());
    }

    #[test]
    fn broker_is_trimmed_and_aliases_accepted() {
        let rec = normalize_at(&raw(json!({"brokerId": "  bet365 "})), 0).unwrap();
        assert_eq!(rec.broker, "bet365");
        let rec = normalize_at(&raw(json!({"id": "gg"})), 0).unwrap();
        assert_eq!(rec.broker, "gg");
    }

    #[test]
    fn spread_payload_with_several_broker_keys_is_accepted() {
        let rec = normalize_at(
            &raw(json!({"broker": "bet365", "id": "row-7", "brokerId": "tab-3", "odds": ["1.9", "2.0"]})),
            0,
        )
        .unwrap();
        assert_eq!(rec.broker, "bet365");
        assert_eq!(rec.odds, ["1.9".to_string(), "2.0".to_string()]);

        // an unusable `broker` falls through to the next spelling
        let rec = normalize_at(&raw(json!({"broker": "", "brokerId": 9, "id": "gg"})), 0).unwrap();
        assert_eq!(rec.broker, "gg");

        let rec = normalize_at(&raw(json!({"broker": "b", "ts": 10, "timestamp": 20})), 0).unwrap();
        assert_eq!(rec.ts, 10);
        let rec = normalize_at(&raw(json!({"broker": "b", "ts": "x", "timestamp": 20})), 0).unwrap();
        assert_eq!(rec.ts, 20);
    }

    #[test]
    fn frozen_uses_js_truthiness() {
        let frozen = |v: Value| normalize_at(&raw(json!({"broker": "b", "frozen": v})), 0).unwrap().frozen;
        assert!(frozen(json!(true)));
        assert!(frozen(json!(1)));
        assert!(frozen(json!("yes")));
        assert!(frozen(json!({})));
        assert!(!frozen(json!(false)));
        assert!(!frozen(json!(0)));
        assert!(!frozen(json!("")));
        assert!(!frozen(json!(null)));
    }

    #[test]
    fn missing_ts_uses_receive_time_and_bad_map_is_dropped() {
        let rec = normalize_at(&raw(json!({"broker": "b", "ts": "soon", "map": 1.5})), 777).unwrap();
        assert_eq!(rec.ts, 777);
        assert_eq!(rec.map, None);

        let rec = normalize_at(&raw(json!({"broker": "b", "timestamp": 1234.0, "map": 3.0})), 777).unwrap();
        assert_eq!(rec.ts, 1234);
        assert_eq!(rec.map, Some(3));
    }

    #[test]
    fn unknown_fields_are_not_carried() {
        let sample = raw(json!({"broker": "b", "odds": ["2", "2"], "url": "https://x", "source": "extension"}));
        assert_eq!(sample, RawSample::new("b", ["2", "2"], false).with_frozen_unset());
    }

    #[test]
    fn removed_flag_classifies_as_removal() {
        assert_eq!(classify(&RawSample::removal(" a ")), Some(Ingest::Remove("a".to_string())));
        assert_eq!(classify(&raw(json!({"removed": true}))), None);
        match classify(&raw(json!({"broker": "a", "removed": false, "odds": ["2", "3"]}))) {
            Some(Ingest::Upsert(rec)) => assert_eq!(rec.broker, "a"),
            other => panic!("expected upsert, got {other:?}"),
        }
    }

    #[test]
    fn record_round_trips_through_raw_sample() {
        let rec = OddsRecord::new("excel", ["1.7", "2.2"], true).with_map(Some(1)).with_ts(99);
        assert_eq!(normalize_at(&RawSample::from(&rec), 0), Some(rec));
    }

    impl RawSample {
        fn with_frozen_unset(mut self) -> Self {
            self.frozen = None;
            self
        }
    }
}
