//! Upstream event bus
//!
//! Transports publish here; every hub instance holds its own receiver. This is
//! the only state independent hubs share.

use tokio::sync::broadcast;

use crate::normalize::RawSample;

#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// One extraction tick.
    Sample(RawSample),
    /// Explicit close of a broker view, or its source went away.
    BrokerRemoved(String),
    /// Authoritative set of active brokers; everything else is pruned.
    BrokersKnown(Vec<String>),
    /// Full swap list after a persisted change.
    SwapsUpdated(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct UpstreamBus {
    tx: broadcast::Sender<HubEvent>,
}

impl Default for UpstreamBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl UpstreamBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many hubs will see the event (0 when none is attached).
    pub fn publish(&self, event: HubEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
