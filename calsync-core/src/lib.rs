//! Core types and reconciliation engine for calsync.
//!
//! This crate owns everything that decides *what* to change in the target
//! calendar:
//! - `normalize` / `index` turn raw events into comparable, count-aware buckets
//! - `cancellation` and `diff` compute the operations
//! - `sync` sequences a run against the collaborator traits in `provider`
//!
//! Network access lives in the provider crates, which implement the traits.

pub mod cancellation;
pub mod config;
pub mod constants;
pub mod diff;
pub mod error;
pub mod event;
pub mod ics;
pub mod index;
pub mod normalize;
pub mod provider;
pub mod recurrence;
pub mod retry;
pub mod sync;
pub mod window;

pub use cancellation::{
    CancellationMarker, CancellationOutcome, CancellationRecord, resolve_cancellations,
};
pub use config::{RetryConfig, SyncConfig, WindowConfig};
pub use diff::{OperationKind, SyncOperation, diff};
pub use error::{CalSyncError, CalSyncResult};
pub use event::{EventTime, Origin, RawEvent};
pub use index::EventIndex;
pub use normalize::{CanonicalKey, Normalizer};
pub use provider::{SourceFeed, TargetStore, WindowProvider};
pub use retry::RetryPolicy;
pub use sync::{Reconciliation, SyncPlan, SyncRunner, SyncSettings, SyncSummary, reconcile};
pub use window::{BusinessWeekWindow, SyncWindow};
