use std::collections::HashSet;

use crate::parser::events::{EventKey, KillEvent};

/// Set of already-applied event keys. Append-only outside an explicit reset.
#[derive(Debug, Default, Clone)]
pub struct Deduplicator {
    processed: HashSet<EventKey>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys(keys: impl IntoIterator<Item = EventKey>) -> Self {
        Self {
            processed: keys.into_iter().collect(),
        }
    }

    /// Returns true and records the key if the event has not been seen before.
    pub fn admit(&mut self, event: &KillEvent) -> bool {
        self.processed.insert(event.key())
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.processed.contains(key)
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    /// Keys in a deterministic order for snapshotting.
    pub fn keys(&self) -> Vec<EventKey> {
        let mut keys: Vec<_> = self.processed.iter().cloned().collect();
        keys.sort();
        keys
    }

    pub(crate) fn clear(&mut self) {
        self.processed.clear();
    }
}
