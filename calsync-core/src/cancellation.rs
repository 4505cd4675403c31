//! Cancellation markers.
//!
//! Teams does not drop a cancelled meeting from the feed; it renames it to
//! `"Cancelado: <title>"` and keeps its slot. Such events never become
//! regular events. Each one instead removes every target event carrying the
//! original title at the same time.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::constants::DEFAULT_CANCELLATION_PREFIX;
use crate::diff::SyncOperation;
use crate::event::RawEvent;
use crate::index::EventIndex;
use crate::normalize::{CanonicalKey, Normalizer};

/// Title prefix that marks an event as a cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationMarker(String);

impl Default for CancellationMarker {
    fn default() -> Self {
        CancellationMarker(DEFAULT_CANCELLATION_PREFIX.to_string())
    }
}

impl CancellationMarker {
    pub fn new(prefix: impl Into<String>) -> Self {
        CancellationMarker(prefix.into())
    }

    pub fn prefix(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, title: &str) -> bool {
        title.trim_start().starts_with(&self.0)
    }

    /// The cancelled event's title, if `title` carries the marker.
    pub fn strip<'a>(&self, title: &'a str) -> Option<&'a str> {
        title.trim_start().strip_prefix(self.0.as_str()).map(str::trim)
    }

    /// Split source events into (regular, cancellations).
    pub fn partition(&self, events: Vec<RawEvent>) -> (Vec<RawEvent>, Vec<RawEvent>) {
        let (cancellations, regular) = events.into_iter().partition(|e| self.matches(&e.title));
        (regular, cancellations)
    }
}

/// A cancellation event paired with the key of the event it cancels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationRecord {
    pub marker_title: String,
    pub original_key: CanonicalKey,
}

impl CancellationRecord {
    /// `None` when `event` does not carry the marker.
    pub fn from_event(
        event: &RawEvent,
        marker: &CancellationMarker,
        normalizer: &Normalizer,
    ) -> Option<Self> {
        let original_title = marker.strip(&event.title)?;
        Some(CancellationRecord {
            marker_title: event.title.clone(),
            original_key: normalizer.key_for(original_title, &event.start, &event.end),
        })
    }
}

/// What resolving a batch of cancellations produced.
#[derive(Debug, Clone, Default)]
pub struct CancellationOutcome {
    /// One delete per target event under a cancelled key.
    pub operations: Vec<SyncOperation>,
    /// Cancelled keys present in the target.
    pub matched: usize,
    /// Cancelled keys the target never had (or already lost).
    pub unmatched: usize,
    /// Every distinct cancelled key, matched or not.
    pub cancelled_keys: BTreeSet<CanonicalKey>,
}

/// Match cancellation events against the target index.
///
/// A key named by several cancellation events is resolved once.
pub fn resolve_cancellations(
    cancel_events: &[RawEvent],
    target: &EventIndex,
    marker: &CancellationMarker,
    normalizer: &Normalizer,
) -> CancellationOutcome {
    let mut outcome = CancellationOutcome::default();

    for event in cancel_events {
        let Some(record) = CancellationRecord::from_event(event, marker, normalizer) else {
            continue;
        };

        if !outcome.cancelled_keys.insert(record.original_key.clone()) {
            debug!("Repeated cancellation for {}", record.original_key);
            continue;
        }

        let bucket = target.get(&record.original_key);
        if bucket.is_empty() {
            info!(
                "No matching event for '{}': {}",
                record.marker_title, record.original_key
            );
            outcome.unmatched += 1;
            continue;
        }

        info!(
            "'{}' cancels {} target event(s): {}",
            record.marker_title,
            bucket.len(),
            record.original_key
        );
        outcome.matched += 1;
        outcome.operations.extend(
            bucket
                .iter()
                .map(|e| SyncOperation::delete(&record.original_key, e)),
        );
    }

    outcome
}
