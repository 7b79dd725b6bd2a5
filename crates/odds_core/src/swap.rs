//! Per-broker side swap
//!
//! Some extraction scripts report the two teams in the opposite order. A user
//! marks such a broker as swapped and every view presents its odds reversed.
//! The list is written through to a `SwapStore` before anyone is told about
//! the change.

use anyhow::Result;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::error::OddsError;
use crate::record::{OddsRecord, EXCEL_BROKER};

/// Durable home of the swap list.
pub trait SwapStore: Send {
    fn load(&self) -> Result<Vec<String>>;
    fn save(&self, brokers: &[String]) -> Result<()>;
}

/// Store that keeps the list in memory; clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct MemorySwapStore {
    inner: Arc<Mutex<Vec<String>>>,
}

impl MemorySwapStore {
    pub fn new(initial: &[&str]) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial.iter().map(|s| s.to_string()).collect())),
        }
    }

    pub fn saved(&self) -> Vec<String> {
        self.inner.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl SwapStore for MemorySwapStore {
    fn load(&self) -> Result<Vec<String>> {
        Ok(self.saved())
    }

    fn save(&self, brokers: &[String]) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("swap store mutex poisoned"))?;
        *guard = brokers.to_vec();
        Ok(())
    }
}

pub struct SwapOverlay {
    swapped: BTreeSet<String>,
    store:   Option<Box<dyn SwapStore>>,
}

impl fmt::Debug for SwapOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapOverlay")
            .field("swapped", &self.swapped)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl Default for SwapOverlay {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl SwapOverlay {
    /// Mirror-only overlay, fed by broadcast lists.
    pub fn in_memory() -> Self {
        Self { swapped: BTreeSet::new(), store: None }
    }

    /// Load the persisted list and write every later mutation through.
    pub fn with_store(store: Box<dyn SwapStore>) -> Result<Self, OddsError> {
        let loaded = store.load().map_err(OddsError::Load)?;
        let swapped = clean(loaded);
        debug!("swap overlay loaded {} broker(s)", swapped.len());
        Ok(Self { swapped, store: Some(store) })
    }

    pub fn is_swapped(&self, broker: &str) -> bool {
        self.swapped.contains(broker.trim())
    }

    /// Flip a broker and return its new state. The reserved reference feed
    /// and blank ids are left alone and report `false`.
    pub fn toggle(&mut self, broker: &str) -> Result<bool, OddsError> {
        let Some(id) = swappable(broker) else {
            return Ok(false);
        };
        let want = !self.swapped.contains(&id);
        self.set_inner(id, want)?;
        Ok(want)
    }

    pub fn set(&mut self, broker: &str, swapped: bool) -> Result<(), OddsError> {
        match swappable(broker) {
            Some(id) => self.set_inner(id, swapped),
            None => Ok(()),
        }
    }

    /// Adopt a whole list (e.g. one broadcast by the owning process).
    /// Returns whether anything changed.
    pub fn replace_all<I, S>(&mut self, brokers: I) -> Result<bool, OddsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let next = clean(brokers);
        if next == self.swapped {
            return Ok(false);
        }
        let prev = std::mem::replace(&mut self.swapped, next);
        if let Err(e) = self.persist() {
            self.swapped = prev;
            return Err(e);
        }
        Ok(true)
    }

    /// Sorted, de-duplicated list.
    pub fn list(&self) -> Vec<String> {
        self.swapped.iter().cloned().collect()
    }

    /// Copy of `record` with sides reversed iff its broker is swapped.
    pub fn apply_to(&self, record: &OddsRecord) -> OddsRecord {
        if self.is_swapped(&record.broker) {
            record.swapped()
        } else {
            record.clone()
        }
    }

    fn set_inner(&mut self, id: String, want: bool) -> Result<(), OddsError> {
        let changed = if want {
            self.swapped.insert(id.clone())
        } else {
            self.swapped.remove(&id)
        };
        if !changed {
            return Ok(());
        }
        if let Err(e) = self.persist() {
            warn!("swap persist failed for {}: {}", id, e);
            if want {
                self.swapped.remove(&id);
            } else {
                self.swapped.insert(id);
            }
            return Err(e);
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), OddsError> {
        match &self.store {
            Some(store) => store.save(&self.list()).map_err(OddsError::Persist),
            None => Ok(()),
        }
    }
}

fn swappable(broker: &str) -> Option<String> {
    let id = broker.trim();
    (!id.is_empty() && id != EXCEL_BROKER).then(|| id.to_string())
}

fn clean<I, S>(brokers: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    brokers.into_iter().filter_map(|b| swappable(b.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;

    impl SwapStore for FailingStore {
        fn load(&self) -> Result<Vec<String>> {
            Ok(vec!["a".to_string()])
        }
        fn save(&self, _brokers: &[String]) -> Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[test]
    fn toggle_twice_restores_record() {
        let mut overlay = SwapOverlay::in_memory();
        let rec = OddsRecord::new("a", ["2.0", "1.8"], false);

        assert!(overlay.toggle("a").unwrap());
        let once = overlay.apply_to(&rec);
        assert_eq!(once.odds, ["1.8".to_string(), "2.0".to_string()]);

        assert!(!overlay.toggle("a").unwrap());
        assert_eq!(overlay.apply_to(&rec), rec);
        assert_eq!(overlay.apply_to(&once).swapped(), rec);
    }

    #[test]
    fn apply_to_leaves_input_untouched() {
        let mut overlay = SwapOverlay::in_memory();
        overlay.set("a", true).unwrap();
        let rec = OddsRecord::new("a", ["2.0", "1.8"], false);
        let _ = overlay.apply_to(&rec);
        assert_eq!(rec.odds[0], "2.0");
    }

    #[test]
    fn excel_is_never_swappable() {
        let mut overlay = SwapOverlay::in_memory();
        assert!(!overlay.toggle(EXCEL_BROKER).unwrap());
        overlay.set(EXCEL_BROKER, true).unwrap();
        overlay.replace_all(["excel", "b"]).unwrap();
        assert!(!overlay.is_swapped(EXCEL_BROKER));
        assert_eq!(overlay.list(), vec!["b".to_string()]);
    }

    #[test]
    fn mutations_write_through() {
        let store = MemorySwapStore::new(&["b", " b ", ""]);
        let mut overlay = SwapOverlay::with_store(Box::new(store.clone())).unwrap();
        assert_eq!(overlay.list(), vec!["b".to_string()]);

        overlay.toggle("a").unwrap();
        assert_eq!(store.saved(), vec!["a".to_string(), "b".to_string()]);

        overlay.set("b", false).unwrap();
        assert_eq!(store.saved(), vec!["a".to_string()]);

        assert!(!overlay.replace_all(["a"]).unwrap());
        assert!(overlay.replace_all(["c"]).unwrap());
        assert_eq!(store.saved(), vec!["c".to_string()]);
    }

    #[test]
    fn failed_write_rolls_back() {
        let mut overlay = SwapOverlay::with_store(Box::new(FailingStore)).unwrap();
        assert!(matches!(overlay.toggle("b"), Err(OddsError::Persist(_))));
        assert!(!overlay.is_swapped("b"));
        assert!(overlay.set("a", false).is_err());
        assert!(overlay.is_swapped("a"));
        assert!(overlay.replace_all(["z"]).is_err());
        assert_eq!(overlay.list(), vec!["a".to_string()]);
    }
}
