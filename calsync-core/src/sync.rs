//! Run orchestration.
//!
//! A run resolves the window, fetches both sides, indexes them, resolves
//! cancellations, diffs, then applies. Cancellations are resolved before the
//! diff and their keys leave both indices, so the diff never sees them.

use std::collections::BTreeSet;
use std::fmt;

use chrono_tz::Tz;
use serde::Serialize;
use tracing::{info, warn};

use crate::cancellation::{CancellationMarker, CancellationOutcome, resolve_cancellations};
use crate::config::SyncConfig;
use crate::diff::{SyncOperation, diff};
use crate::error::{CalSyncError, CalSyncResult};
use crate::event::RawEvent;
use crate::index::EventIndex;
use crate::normalize::Normalizer;
use crate::provider::{SourceFeed, TargetStore, WindowProvider};
use crate::window::{BusinessWeekWindow, SyncWindow};

/// What a run needs to know to compare events.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub normalizer: Normalizer,
    pub marker: CancellationMarker,
}

impl SyncSettings {
    pub fn new(tz: Tz) -> Self {
        SyncSettings {
            normalizer: Normalizer::new(tz),
            marker: CancellationMarker::default(),
        }
    }

    pub fn with_marker(mut self, marker: CancellationMarker) -> Self {
        self.marker = marker;
        self
    }
}

/// The pure outcome of comparing both sides.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub cancellations: CancellationOutcome,
    /// Diff operations, computed after cancelled keys were removed.
    pub operations: Vec<SyncOperation>,
}

impl Reconciliation {
    /// Every operation in application order: cancellation deletes first.
    pub fn all_operations(&self) -> impl Iterator<Item = &SyncOperation> {
        self.cancellations.operations.iter().chain(&self.operations)
    }

    pub fn is_empty(&self) -> bool {
        self.cancellations.operations.is_empty() && self.operations.is_empty()
    }
}

/// Compare fetched events and decide what to change. No I/O.
pub fn reconcile(
    source: Vec<RawEvent>,
    target: Vec<RawEvent>,
    settings: &SyncSettings,
) -> Reconciliation {
    let (regular, cancel_events) = settings.marker.partition(source);

    let mut source_index = EventIndex::build(regular, &settings.normalizer);
    let mut target_index = EventIndex::build(target, &settings.normalizer);

    let cancellations = resolve_cancellations(
        &cancel_events,
        &target_index,
        &settings.marker,
        &settings.normalizer,
    );

    // A cancelled key is settled for this run on both sides.
    for key in &cancellations.cancelled_keys {
        source_index.remove(key);
        target_index.remove(key);
    }

    let operations = diff(&source_index, &target_index);

    Reconciliation {
        cancellations,
        operations,
    }
}

/// A computed run, before anything is applied.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub window: SyncWindow,
    pub reconciliation: Reconciliation,
    pub source_count: usize,
    pub target_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub created: usize,
    /// Includes deletes caused by cancellations.
    pub deleted: usize,
    /// Cancellations whose deletes all succeeded.
    pub cancellations_applied: usize,
    pub cancellations_unmatched: usize,
    pub failed_creates: usize,
    pub failed_deletes: usize,
}

impl SyncSummary {
    pub fn has_failures(&self) -> bool {
        self.failed_creates > 0 || self.failed_deletes > 0
    }

    pub fn is_empty(&self) -> bool {
        *self == SyncSummary::default()
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} deleted, {} cancellation(s) applied, {} unmatched",
            self.created, self.deleted, self.cancellations_applied, self.cancellations_unmatched
        )?;
        if self.has_failures() {
            write!(
                f,
                ", {} create(s) and {} delete(s) failed",
                self.failed_creates, self.failed_deletes
            )?;
        }
        Ok(())
    }
}

/// Drives runs against one source, one target and a window.
pub struct SyncRunner<S, T, W> {
    settings: SyncSettings,
    source: S,
    target: T,
    window: W,
}

impl<S, T> SyncRunner<S, T, BusinessWeekWindow>
where
    S: SourceFeed,
    T: TargetStore,
{
    /// Validate `config` and build a runner over the business-week window.
    /// Fails before any collaborator is touched.
    pub fn from_config(config: &SyncConfig, source: S, target: T) -> CalSyncResult<Self> {
        config.validate()?;
        Ok(SyncRunner::new(config.settings()?, source, target, config.window()?))
    }
}

impl<S, T, W> SyncRunner<S, T, W>
where
    S: SourceFeed,
    T: TargetStore,
    W: WindowProvider,
{
    pub fn new(settings: SyncSettings, source: S, target: T, window: W) -> Self {
        SyncRunner {
            settings,
            source,
            target,
            window,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn current_window(&self) -> SyncWindow {
        self.window.current_window()
    }

    /// Fetch both sides and compute the operations, without applying them.
    ///
    /// A fetch failure aborts: an unreachable feed is never read as empty.
    pub async fn plan(&self) -> CalSyncResult<SyncPlan> {
        let window = self.window.current_window();
        info!("Sync window: {}", window);

        let source = self.source.fetch_events(&window).await?;
        let target = self.target.list_events(&window).await?;
        let (source_count, target_count) = (source.len(), target.len());
        info!(
            "Fetched {} source and {} target event(s)",
            source_count, target_count
        );

        let reconciliation = reconcile(source, target, &self.settings);
        info!(
            "Planned {} cancellation delete(s) and {} operation(s)",
            reconciliation.cancellations.operations.len(),
            reconciliation.operations.len()
        );

        Ok(SyncPlan {
            window,
            reconciliation,
            source_count,
            target_count,
        })
    }

    /// Apply `plan` sequentially. Individual failures are counted, not fatal.
    ///
    /// A cancellation counts as applied only once every delete it caused went
    /// through.
    pub async fn apply(&self, plan: &SyncPlan) -> SyncSummary {
        let cancellations = &plan.reconciliation.cancellations;
        let mut summary = SyncSummary {
            cancellations_unmatched: cancellations.unmatched,
            ..SyncSummary::default()
        };

        let mut incomplete = BTreeSet::new();
        for op in &cancellations.operations {
            if !self.apply_operation(op, &mut summary).await {
                incomplete.insert(op.key());
            }
        }
        summary.cancellations_applied = cancellations.matched.saturating_sub(incomplete.len());

        for op in &plan.reconciliation.operations {
            self.apply_operation(op, &mut summary).await;
        }

        summary
    }

    /// Plan and apply.
    pub async fn run(&self) -> CalSyncResult<SyncSummary> {
        let plan = self.plan().await?;
        let summary = self.apply(&plan).await;
        if summary.has_failures() {
            warn!("Sync finished with failures: {}", summary);
        } else {
            info!("Sync finished: {}", summary);
        }
        Ok(summary)
    }

    /// Delete every target event in the current window.
    pub async fn purge(&self) -> CalSyncResult<SyncSummary> {
        let window = self.window.current_window();
        info!("Purging target events in {}", window);

        let target = self.target.list_events(&window).await?;
        let mut summary = SyncSummary::default();
        for event in &target {
            let op = SyncOperation::delete(&self.settings.normalizer.key(event), event);
            self.apply_operation(&op, &mut summary).await;
        }

        info!("Purge finished: {}", summary);
        Ok(summary)
    }

    /// Returns whether the operation succeeded.
    async fn apply_operation(&self, op: &SyncOperation, summary: &mut SyncSummary) -> bool {
        match op {
            SyncOperation::Create { title, start, end } => {
                match self.target.create_event(title, *start, *end).await {
                    Ok(id) => {
                        info!("Created {} [{}]", op.key(), id);
                        summary.created += 1;
                        true
                    }
                    Err(e) => {
                        warn!("Failed to create {}: {}", op.key(), e);
                        summary.failed_creates += 1;
                        false
                    }
                }
            }
            SyncOperation::Delete { target_id, .. } => {
                let result = if target_id.is_empty() {
                    Err(CalSyncError::MissingEventId(op.title().to_string()))
                } else {
                    self.target.delete_event(target_id).await
                };
                match result {
                    Ok(()) => {
                        info!("Deleted {} [{}]", op.key(), target_id);
                        summary.deleted += 1;
                        true
                    }
                    Err(e) => {
                        warn!("Failed to delete {}: {}", op.key(), e);
                        summary.failed_deletes += 1;
                        false
                    }
                }
            }
        }
    }
}
