//! Collaborator seams.
//!
//! The orchestrator only talks to these traits. `calsync-provider-teams` and
//! `calsync-provider-google` implement them over HTTP; tests implement them
//! in memory.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::CalSyncResult;
use crate::event::RawEvent;
use crate::window::SyncWindow;

/// The read-only, authoritative event feed.
#[async_trait]
pub trait SourceFeed: Send + Sync {
    /// Events overlapping `window`, recurrences expanded.
    ///
    /// An empty feed is `Ok(vec![])`; failing to reach the feed is an error.
    async fn fetch_events(&self, window: &SyncWindow) -> CalSyncResult<Vec<RawEvent>>;
}

/// The mutable calendar being reconciled.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Events overlapping `window`. Every event carries its store id.
    async fn list_events(&self, window: &SyncWindow) -> CalSyncResult<Vec<RawEvent>>;

    /// Create an event at local civil times and return its new id.
    async fn create_event(
        &self,
        title: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> CalSyncResult<String>;

    /// Delete by id. Deleting an event that is already gone succeeds.
    async fn delete_event(&self, id: &str) -> CalSyncResult<()>;
}

pub trait WindowProvider: Send + Sync {
    fn current_window(&self) -> SyncWindow;
}

/// A fixed window, for tests and one-off runs.
impl WindowProvider for SyncWindow {
    fn current_window(&self) -> SyncWindow {
        *self
    }
}
