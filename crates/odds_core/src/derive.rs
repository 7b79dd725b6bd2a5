//! Mid-price and cross-broker arbitrage
//!
//! Only live records count: not frozen, both sides numeric, broker not in the
//! excluded set. Per side the mid is `(min + max) / 2`; the overround is
//! `1/best0 + 1/best1`, and a value below 1 means backing the best price on
//! each side at different brokers locks in `(1 - overround) * 100` percent.

use serde::Serialize;
use std::collections::HashSet;

use crate::record::OddsRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestQuote {
    pub broker: String,
    pub price:  f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedSnapshot {
    pub has_mid:        bool,
    pub mid:            Option<[f64; 2]>,
    /// `None` when there is no opportunity (overround >= 1) or no data.
    pub arb_profit_pct: Option<f64>,
    pub best:           Option<[BestQuote; 2]>,
    pub overround:      Option<f64>,
}

impl DerivedSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_arb(&self) -> bool {
        self.arb_profit_pct.is_some()
    }
}

struct SideRange<'a> {
    min:  f64,
    max:  f64,
    best: &'a str,
}

fn side_range<'a>(quotes: &[(f64, &'a str)]) -> Option<SideRange<'a>> {
    let (&(first, broker), rest) = quotes.split_first()?;
    let mut range = SideRange { min: first, max: first, best: broker };
    for &(price, broker) in rest {
        if price < range.min {
            range.min = price;
        }
        // strict: the first broker quoting the best price keeps it
        if price > range.max {
            range.max = price;
            range.best = broker;
        }
    }
    Some(range)
}

pub fn derive<'a, I>(records: I, excluded: &HashSet<String>) -> DerivedSnapshot
where
    I: IntoIterator<Item = &'a OddsRecord>,
{
    let mut sides: [Vec<(f64, &str)>; 2] = [Vec::new(), Vec::new()];

    for rec in records {
        if rec.frozen || excluded.contains(&rec.broker) {
            continue;
        }
        let Some([a, b]) = rec.parsed_odds() else {
            continue;
        };
        sides[0].push((a, rec.broker.as_str()));
        sides[1].push((b, rec.broker.as_str()));
    }

    let (Some(s0), Some(s1)) = (side_range(&sides[0]), side_range(&sides[1])) else {
        return DerivedSnapshot::empty();
    };

    let overround = 1.0 / s0.max + 1.0 / s1.max;
    let arb_profit_pct = (overround < 1.0).then(|| (1.0 - overround) * 100.0);

    DerivedSnapshot {
        has_mid: true,
        mid: Some([(s0.min + s0.max) / 2.0, (s1.min + s1.max) / 2.0]),
        arb_profit_pct,
        best: Some([
            BestQuote { broker: s0.best.to_string(), price: s0.max },
            BestQuote { broker: s1.best.to_string(), price: s1.max },
        ]),
        overround: Some(overround),
    }
}
