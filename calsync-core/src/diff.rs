//! Count-aware diff between the source and target indices.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::event::RawEvent;
use crate::index::EventIndex;
use crate::normalize::CanonicalKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Create,
    Delete,
}

impl OperationKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            OperationKind::Create => "+",
            OperationKind::Delete => "-",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A single mutation to apply to the target store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum SyncOperation {
    Create {
        title: String,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    Delete {
        target_id: String,
        title: String,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

impl SyncOperation {
    pub fn create(key: &CanonicalKey) -> Self {
        SyncOperation::Create {
            title: key.title.clone(),
            start: key.start,
            end: key.end,
        }
    }

    /// Delete `event`, described by the key it was indexed under.
    pub fn delete(key: &CanonicalKey, event: &RawEvent) -> Self {
        SyncOperation::Delete {
            target_id: event.source_id.clone().unwrap_or_default(),
            title: key.title.clone(),
            start: key.start,
            end: key.end,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            SyncOperation::Create { .. } => OperationKind::Create,
            SyncOperation::Delete { .. } => OperationKind::Delete,
        }
    }

    pub fn key(&self) -> CanonicalKey {
        match self {
            SyncOperation::Create { title, start, end }
            | SyncOperation::Delete {
                title, start, end, ..
            } => CanonicalKey::new(title, *start, *end),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            SyncOperation::Create { title, .. } | SyncOperation::Delete { title, .. } => title,
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.key())
    }
}

/// Operations that bring every target bucket to the size of its source bucket.
///
/// Creates come first, then deletes; both walk keys chronologically. Surplus
/// target duplicates are removed from the front of their bucket.
pub fn diff(source: &EventIndex, target: &EventIndex) -> Vec<SyncOperation> {
    let mut creates = Vec::new();
    let mut deletes = Vec::new();

    for (key, bucket) in source.iter() {
        let wanted = bucket.len();
        let present = target.count(key);
        if wanted > present {
            creates.extend((0..wanted - present).map(|_| SyncOperation::create(key)));
        }
    }

    for (key, bucket) in target.iter() {
        let present = bucket.len();
        let wanted = source.count(key);
        if present > wanted {
            deletes.extend(
                bucket
                    .iter()
                    .take(present - wanted)
                    .map(|event| SyncOperation::delete(key, event)),
            );
        }
    }

    creates.extend(deletes);
    creates
}
