//! Odds hub
//!
//! Owns one registry, one swap overlay and the subscriber list. Every mutation
//! runs to completion on the calling thread: apply, derive, fan out. A hub is
//! deliberately `!Send`; run one per display surface, each attached to the
//! same `UpstreamBus`.

use anyhow::Result;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::{debug, info, warn};

use crate::derive::{derive, DerivedSnapshot};
use crate::error::OddsError;
use crate::normalize::{classify, Ingest, RawSample};
use crate::record::{default_excluded, OddsRecord, RESERVED_BROKERS};
use crate::registry::OddsRegistry;
use crate::swap::SwapOverlay;
use crate::upstream::{HubEvent, UpstreamBus};

type Callback = Box<dyn FnMut(&HubSnapshot) -> Result<()>>;

/// What every subscriber receives.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HubSnapshot {
    /// Bumped once per notification.
    pub seq:     u64,
    /// Broker order, swap overlay applied.
    pub records: Vec<OddsRecord>,
    pub swapped: Vec<String>,
    pub derived: DerivedSnapshot,
}

impl HubSnapshot {
    pub fn record(&self, broker: &str) -> Option<&OddsRecord> {
        self.records.iter().find(|r| r.broker == broker)
    }

    /// Parsed odds of a reference feed (`excel`, `ds`), frozen or not.
    pub fn reference_odds(&self, broker: &str) -> Option<[f64; 2]> {
        self.record(broker)?.parsed_odds()
    }

    pub fn is_frozen(&self, broker: &str) -> bool {
        self.record(broker).map_or(false, |r| r.frozen)
    }

    pub fn live_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_live()).count()
    }

    /// One row per id, in the given order; ids without data get a frozen
    /// placeholder.
    pub fn board_rows<I, S>(&self, ids: I) -> Vec<OddsRecord>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter()
            .map(|id| {
                let id = id.as_ref();
                self.record(id)
                    .cloned()
                    .unwrap_or_else(|| OddsRecord::placeholder(id))
            })
            .collect()
    }
}

struct Subscriber {
    id:       u64,
    name:     String,
    callback: Rc<RefCell<Callback>>,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<Subscriber>,
}

impl Subscribers {
    fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|s| s.id == id)
    }
}

/// Handle returned by [`OddsHub::subscribe`]. Dropping it keeps the
/// subscription alive; call [`Subscription::unsubscribe`] to detach. Safe to
/// call from inside a callback.
pub struct Subscription {
    id:   u64,
    list: Weak<RefCell<Subscribers>>,
}

impl Subscription {
    /// Returns false if already detached or the hub is gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(list) = self.list.upgrade() else {
            return false;
        };
        let mut list = list.borrow_mut();
        let before = list.entries.len();
        list.entries.retain(|s| s.id != self.id);
        list.entries.len() != before
    }
}

pub struct OddsHub {
    name:        String,
    registry:    OddsRegistry,
    swaps:       SwapOverlay,
    excluded:    HashSet<String>,
    subscribers: Rc<RefCell<Subscribers>>,
    current:     HubSnapshot,
    upstream:    Option<broadcast::Receiver<HubEvent>>,
}

impl OddsHub {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name:        name.into(),
            registry:    OddsRegistry::new(),
            swaps:       SwapOverlay::in_memory(),
            excluded:    default_excluded(),
            subscribers: Rc::new(RefCell::new(Subscribers::default())),
            current:     HubSnapshot::default(),
            upstream:    None,
        }
    }

    pub fn with_swaps(mut self, swaps: SwapOverlay) -> Self {
        self.swaps = swaps;
        self.rebuild(self.current.seq);
        self
    }

    /// Extra brokers kept out of derivation, on top of the reserved feeds.
    pub fn with_excluded<I, S>(mut self, brokers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded.extend(
            brokers
                .into_iter()
                .map(|b| b.as_ref().trim().to_string())
                .filter(|b| !b.is_empty()),
        );
        self.rebuild(self.current.seq);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &OddsRegistry {
        &self.registry
    }

    pub fn swaps(&self) -> &SwapOverlay {
        &self.swaps
    }

    pub fn snapshot(&self) -> &HubSnapshot {
        &self.current
    }

    pub fn derived(&self) -> &DerivedSnapshot {
        &self.current.derived
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().entries.len()
    }

    // ── Subscriptions ────────────────────────────────────────────────────

    /// Register a consumer. It is called right away with the current
    /// snapshot, then after every mutation. An `Err` or a panic from one
    /// callback is logged and does not stop the others.
    pub fn subscribe<F>(&mut self, name: &str, callback: F) -> Subscription
    where
        F: FnMut(&HubSnapshot) -> Result<()> + 'static,
    {
        let callback: Rc<RefCell<Callback>> = Rc::new(RefCell::new(Box::new(callback)));
        let id = {
            let mut list = self.subscribers.borrow_mut();
            let id = list.next_id;
            list.next_id += 1;
            list.entries.push(Subscriber {
                id,
                name: name.to_string(),
                callback: Rc::clone(&callback),
            });
            id
        };
        debug!(hub = %self.name, subscriber = name, "subscribed");

        invoke(name, &callback, &self.current);

        Subscription { id, list: Rc::downgrade(&self.subscribers) }
    }

    fn notify(&self) {
        let targets: Vec<(u64, String, Rc<RefCell<Callback>>)> = self
            .subscribers
            .borrow()
            .entries
            .iter()
            .map(|s| (s.id, s.name.clone(), Rc::clone(&s.callback)))
            .collect();

        for (id, name, callback) in targets {
            // detached by an earlier callback in this same round
            if !self.subscribers.borrow().contains(id) {
                continue;
            }
            invoke(&name, &callback, &self.current);
        }
    }

    fn rebuild(&mut self, seq: u64) {
        let records: Vec<OddsRecord> = self
            .registry
            .records()
            .map(|r| self.swaps.apply_to(r))
            .collect();
        let derived = derive(&records, &self.excluded);
        self.current = HubSnapshot {
            seq,
            records,
            swapped: self.swaps.list(),
            derived,
        };
    }

    fn refresh(&mut self) {
        self.rebuild(self.current.seq + 1);
        self.notify();
    }

    // ── Mutations ────────────────────────────────────────────────────────

    /// Full replace under `record.broker`; always notifies.
    pub fn upsert(&mut self, record: OddsRecord) {
        if self.registry.upsert(record) {
            self.refresh();
        }
    }

    /// Notifies only if the broker was present.
    pub fn remove(&mut self, broker: &str) -> bool {
        let removed = self.registry.remove(broker.trim());
        if removed {
            debug!(hub = %self.name, broker, "broker removed");
            self.refresh();
        }
        removed
    }

    /// Prune everything not in `ids`. Reference feeds are kept regardless.
    pub fn sync_known_brokers<I, S>(&mut self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keep: Vec<String> = ids
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .chain(RESERVED_BROKERS.iter().map(|s| s.to_string()))
            .collect();
        let pruned = self.registry.sync_known_brokers(&keep);
        if !pruned.is_empty() {
            info!(hub = %self.name, ?pruned, "pruned stale brokers");
            self.refresh();
        }
        pruned
    }

    /// Normalize and apply one raw sample. Malformed samples are dropped.
    pub fn ingest(&mut self, raw: &RawSample) -> bool {
        match classify(raw) {
            Some(Ingest::Upsert(record)) => {
                self.upsert(record);
                true
            }
            Some(Ingest::Remove(broker)) => self.remove(&broker),
            None => {
                debug!(hub = %self.name, "dropping sample without broker");
                false
            }
        }
    }

    pub fn toggle_swap(&mut self, broker: &str) -> Result<bool, OddsError> {
        let before = self.swaps.is_swapped(broker);
        let now = self.swaps.toggle(broker)?;
        if now != before {
            self.refresh();
        }
        Ok(now)
    }

    pub fn set_swap(&mut self, broker: &str, swapped: bool) -> Result<(), OddsError> {
        let before = self.swaps.is_swapped(broker);
        self.swaps.set(broker, swapped)?;
        if self.swaps.is_swapped(broker) != before {
            self.refresh();
        }
        Ok(())
    }

    /// Adopt a broadcast swap list. A failed write-through is logged and the
    /// previous list stays in effect.
    pub fn set_swapped_list<I, S>(&mut self, brokers: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match self.swaps.replace_all(brokers) {
            Ok(true) => {
                self.refresh();
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(hub = %self.name, "swap list not applied: {}", e);
                false
            }
        }
    }

    pub fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Sample(raw) => {
                self.ingest(&raw);
            }
            HubEvent::BrokerRemoved(broker) => {
                self.remove(&broker);
            }
            HubEvent::BrokersKnown(ids) => {
                self.sync_known_brokers(ids);
            }
            HubEvent::SwapsUpdated(list) => {
                self.set_swapped_list(list);
            }
        }
    }

    // ── Upstream ─────────────────────────────────────────────────────────

    /// Attach to the bus. A second call is a no-op and returns false.
    pub fn start(&mut self, bus: &UpstreamBus) -> bool {
        if self.upstream.is_some() {
            debug!(hub = %self.name, "already attached to upstream");
            return false;
        }
        self.attach(bus.subscribe())
    }

    /// Attach a receiver obtained earlier (so nothing published between
    /// subscribing and starting is missed).
    pub fn attach(&mut self, rx: broadcast::Receiver<HubEvent>) -> bool {
        if self.upstream.is_some() {
            debug!(hub = %self.name, "already attached to upstream");
            return false;
        }
        self.upstream = Some(rx);
        info!(hub = %self.name, "attached to upstream");
        true
    }

    pub fn is_started(&self) -> bool {
        self.upstream.is_some()
    }

    /// Apply every event already queued, without blocking.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let Some(rx) = self.upstream.as_mut() else {
                return handled;
            };
            match rx.try_recv() {
                Ok(event) => {
                    self.handle(event);
                    handled += 1;
                }
                Err(TryRecvError::Lagged(n)) => {
                    warn!(hub = %self.name, "upstream lagged, {} event(s) lost", n);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return handled,
            }
        }
    }

    /// Event loop for a dedicated thread; returns once every publisher is
    /// gone. Must not be called from inside an async runtime.
    pub fn run_blocking(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let Some(rx) = self.upstream.as_mut() else {
                warn!(hub = %self.name, "run_blocking without upstream");
                return handled;
            };
            match rx.blocking_recv() {
                Ok(event) => {
                    self.handle(event);
                    handled += 1;
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(hub = %self.name, "upstream lagged, {} event(s) lost", n);
                }
                Err(RecvError::Closed) => {
                    info!(hub = %self.name, handled, "upstream closed");
                    return handled;
                }
            }
        }
    }
}

fn invoke(name: &str, callback: &RefCell<Callback>, snapshot: &HubSnapshot) {
    let Ok(mut cb) = callback.try_borrow_mut() else {
        warn!(subscriber = name, "skipping re-entrant notification");
        return;
    };
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let f: &mut Callback = &mut cb;
        f(snapshot)
    }));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(subscriber = name, "subscriber failed: {:#}", e),
        Err(_) => warn!(subscriber = name, "subscriber panicked"),
    }
}
