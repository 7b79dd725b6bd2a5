/// OddsMoni Arb Detector
/// Watches hub snapshots and records cross-broker arbitrage windows.
/// OBSERVE only: logs, never places anything.

use chrono::{DateTime, Utc};
use logger::{now_iso, ArbClosedEvent, ArbOpportunityEvent, EventLogger};
use odds_core::{BestQuote, HubSnapshot};
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct ArbOpportunity {
    pub profit_pct: f64,
    pub overround:  f64,
    pub side1:      BestQuote,
    pub side2:      BestQuote,
    pub mid:        Option<[f64; 2]>,
}

impl ArbOpportunity {
    fn from_snapshot(snap: &HubSnapshot) -> Option<Self> {
        let d = &snap.derived;
        let profit_pct = d.arb_profit_pct?;
        let [side1, side2] = d.best.clone()?;
        Some(Self {
            profit_pct,
            overround: d.overround?,
            side1,
            side2,
            mid: d.mid,
        })
    }

    fn same_pair(&self, other: &ArbOpportunity) -> bool {
        self.side1.broker == other.side1.broker && self.side2.broker == other.side2.broker
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArbSignal {
    /// A new window opened.
    Opened(ArbOpportunity),
    /// Still open, but the best-price brokers moved.
    Changed(ArbOpportunity),
    Closed { last: ArbOpportunity, open_secs: i64 },
}

struct OpenArb {
    since: DateTime<Utc>,
    last:  ArbOpportunity,
}

pub struct ArbDetector {
    logger:         EventLogger,
    min_profit_pct: f64,
    open:           Option<OpenArb>,
}

impl ArbDetector {
    pub fn new(log_dir: impl Into<std::path::PathBuf>, min_profit_pct: f64) -> Self {
        Self {
            logger: EventLogger::new(log_dir),
            min_profit_pct: min_profit_pct.max(0.0),
            open: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Edge-triggered: repeated snapshots of the same window stay silent.
    pub fn observe(&mut self, snap: &HubSnapshot) -> Option<ArbSignal> {
        let current = ArbOpportunity::from_snapshot(snap)
            .filter(|o| o.profit_pct >= self.min_profit_pct);

        let Some(open) = self.open.as_mut() else {
            let opp = current?;
            self.log_opportunity("ARB_OPPORTUNITY", &opp);
            self.open = Some(OpenArb { since: Utc::now(), last: opp.clone() });
            return Some(ArbSignal::Opened(opp));
        };

        match current {
            Some(opp) => {
                let moved = !open.last.same_pair(&opp);
                open.last = opp.clone();
                if !moved {
                    return None;
                }
                self.log_opportunity("ARB_CHANGED", &opp);
                Some(ArbSignal::Changed(opp))
            }
            None => {
                let open = self.open.take()?;
                let open_secs = Utc::now().signed_duration_since(open.since).num_seconds();
                let ev = ArbClosedEvent {
                    ts:              now_iso(),
                    event:           "ARB_CLOSED",
                    last_profit_pct: open.last.profit_pct,
                    open_secs,
                };
                info!("arb closed after {}s (last {:.2}%)", open_secs, open.last.profit_pct);
                let _ = self.logger.log(&ev);
                Some(ArbSignal::Closed { last: open.last, open_secs })
            }
        }
    }

    fn log_opportunity(&self, event: &'static str, opp: &ArbOpportunity) {
        let ev = ArbOpportunityEvent {
            ts:           now_iso(),
            event,
            profit_pct:   opp.profit_pct,
            overround:    opp.overround,
            side1_broker: opp.side1.broker.clone(),
            side1_odds:   opp.side1.price,
            side2_broker: opp.side2.broker.clone(),
            side2_odds:   opp.side2.price,
            mid:          opp.mid,
            action:       "OBSERVE",
        };

        info!(
            profit = format!("{:.2}%", opp.profit_pct),
            side1  = format!("{} @ {:.2}", opp.side1.broker, opp.side1.price),
            side2  = format!("{} @ {:.2}", opp.side2.broker, opp.side2.price),
            "{}",
            event
        );

        let _ = self.logger.log(&ev);
    }
}
