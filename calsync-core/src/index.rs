//! Count-aware grouping of events by canonical key.

use std::collections::BTreeMap;
use std::collections::btree_map;

use crate::event::RawEvent;
use crate::normalize::{CanonicalKey, Normalizer};

/// Events of one origin bucketed by canonical key.
///
/// Buckets keep encounter order and never deduplicate: two independent
/// meetings with the same title and time occupy two slots, which is what lets
/// the diff reconcile counts instead of mere presence.
#[derive(Debug, Clone, Default)]
pub struct EventIndex {
    buckets: BTreeMap<CanonicalKey, Vec<RawEvent>>,
    len: usize,
}

impl EventIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every event in a single pass.
    pub fn build<I>(events: I, normalizer: &Normalizer) -> Self
    where
        I: IntoIterator<Item = RawEvent>,
    {
        let mut index = EventIndex::new();
        for event in events {
            let key = normalizer.key(&event);
            index.insert(key, event);
        }
        index
    }

    pub fn insert(&mut self, key: CanonicalKey, event: RawEvent) {
        self.buckets.entry(key).or_default().push(event);
        self.len += 1;
    }

    /// Events sharing `key`, empty if the key is absent.
    pub fn get(&self, key: &CanonicalKey) -> &[RawEvent] {
        self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, key: &CanonicalKey) -> usize {
        self.get(key).len()
    }

    pub fn contains_key(&self, key: &CanonicalKey) -> bool {
        self.buckets.contains_key(key)
    }

    /// Drop a whole bucket, returning what it held.
    pub fn remove(&mut self, key: &CanonicalKey) -> Option<Vec<RawEvent>> {
        let removed = self.buckets.remove(key)?;
        self.len -= removed.len();
        Some(removed)
    }

    /// Drop the event with store id `id` from the bucket for `key`.
    pub fn remove_id(&mut self, key: &CanonicalKey, id: &str) -> Option<RawEvent> {
        let bucket = self.buckets.get_mut(key)?;
        let pos = bucket
            .iter()
            .position(|e| e.source_id.as_deref() == Some(id))?;
        let removed = bucket.remove(pos);
        if bucket.is_empty() {
            self.buckets.remove(key);
        }
        self.len -= 1;
        Some(removed)
    }

    /// Keys in chronological order.
    pub fn keys(&self) -> btree_map::Keys<'_, CanonicalKey, Vec<RawEvent>> {
        self.buckets.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, CanonicalKey, Vec<RawEvent>> {
        self.buckets.iter()
    }

    /// Total number of indexed events (sum of bucket sizes).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn key_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
