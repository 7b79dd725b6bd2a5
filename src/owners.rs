//! Which live WS connection currently feeds which broker.
//!
//! A broker belongs to the connection that sent its latest sample. Reconnecting
//! extensions therefore take their brokers over, and the old socket's late
//! close no longer removes rows the new one is feeding.

use odds_core::RESERVED_BROKERS;
use std::collections::HashMap;

pub type ConnId = u64;

#[derive(Debug, Default)]
pub struct BrokerOwners {
    owners: HashMap<String, ConnId>,
}

impl BrokerOwners {
    pub fn claim(&mut self, broker: &str, conn: ConnId) {
        self.owners.insert(broker.trim().to_string(), conn);
    }

    /// Explicit close, from whichever connection sent it.
    pub fn forget(&mut self, broker: &str) -> bool {
        self.owners.remove(broker.trim()).is_some()
    }

    /// Mirror of the hub prune: claims outside `ids` go, reference feeds stay.
    pub fn sync<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        let before = self.owners.len();
        self.owners.retain(|broker, _| {
            RESERVED_BROKERS.contains(&broker.as_str())
                || ids.iter().any(|id| id.as_ref().trim() == broker.as_str())
        });
        before - self.owners.len()
    }

    /// Drop every claim `conn` still holds; returns those brokers sorted.
    pub fn disconnect(&mut self, conn: ConnId) -> Vec<String> {
        let mut orphaned: Vec<String> = self
            .owners
            .iter()
            .filter(|(_, owner)| **owner == conn)
            .map(|(broker, _)| broker.clone())
            .collect();
        orphaned.sort();
        self.owners.retain(|_, owner| *owner != conn);
        orphaned
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_returns_only_own_brokers() {
        let mut owners = BrokerOwners::default();
        owners.claim("b", 1);
        owners.claim("a", 1);
        owners.claim("c", 2);

        assert_eq!(owners.disconnect(1), vec!["a".to_string(), "b".to_string()]);
        assert!(owners.disconnect(1).is_empty());
        assert_eq!(owners.disconnect(2), vec!["c".to_string()]);
    }

    #[test]
    fn latest_sender_takes_the_broker_over() {
        let mut owners = BrokerOwners::default();
        owners.claim("bet365", 1);
        owners.claim(" bet365 ", 2);

        assert!(owners.disconnect(1).is_empty());
        assert_eq!(owners.disconnect(2), vec!["bet365".to_string()]);
        assert_eq!(owners.len(), 0);
    }

    #[test]
    fn close_and_sync_release_claims() {
        let mut owners = BrokerOwners::default();
        for b in ["a", "b", "c", "excel"] {
            owners.claim(b, 7);
        }

        assert!(owners.forget("a"));
        assert!(!owners.forget("a"));
        assert_eq!(owners.sync(&["b"]), 1);
        assert_eq!(owners.len(), 2);
        assert_eq!(owners.disconnect(7), vec!["b".to_string(), "excel".to_string()]);
    }
}
