//! Colored terminal rendering for calsync types.

use calsync_core::{OperationKind, SyncOperation, SyncPlan, SyncSummary, SyncWindow};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for OperationKind {
    fn render(&self) -> String {
        let symbol = self.symbol();
        match self {
            OperationKind::Create => symbol.green().to_string(),
            OperationKind::Delete => symbol.red().to_string(),
        }
    }
}

fn colorize(kind: OperationKind, text: &str) -> String {
    match kind {
        OperationKind::Create => text.green().to_string(),
        OperationKind::Delete => text.red().to_string(),
    }
}

impl Render for SyncOperation {
    fn render(&self) -> String {
        let key = self.key();
        let title = if key.title.is_empty() {
            "(untitled)".to_string()
        } else {
            key.title.clone()
        };
        let time = format!(
            "{} - {}",
            key.start.format("%a %d/%m %H:%M"),
            key.end.format("%H:%M")
        );

        format!(
            "{} {} {}",
            self.kind().render(),
            colorize(self.kind(), &title),
            time.dimmed()
        )
    }
}

impl Render for SyncWindow {
    fn render(&self) -> String {
        format!("📅 {}", self.bold())
    }
}

impl Render for SyncSummary {
    fn render(&self) -> String {
        let line = self.to_string();
        if self.has_failures() {
            line.red().to_string()
        } else if self.is_empty() {
            "Nothing to do".dimmed().to_string()
        } else {
            line.green().to_string()
        }
    }
}

/// Above this many operations of one kind, the compact view shows counts.
const COMPACT_THRESHOLD: usize = 5;

pub trait PlanRender {
    fn render(&self, verbose: bool) -> String;
}

impl PlanRender for SyncPlan {
    fn render(&self, verbose: bool) -> String {
        let reconciliation = &self.reconciliation;
        if reconciliation.is_empty() && reconciliation.cancellations.unmatched == 0 {
            return "   No changes".dimmed().to_string();
        }

        let mut lines = Vec::new();

        if !reconciliation.cancellations.operations.is_empty() {
            lines.push("   Cancelled in Teams:".dimmed().to_string());
            render_operations(&reconciliation.cancellations.operations, verbose, &mut lines);
        }
        if reconciliation.cancellations.unmatched > 0 {
            lines.push(
                format!(
                    "   {} cancellation(s) with nothing to delete",
                    reconciliation.cancellations.unmatched
                )
                .dimmed()
                .to_string(),
            );
        }
        if !reconciliation.operations.is_empty() {
            if !lines.is_empty() {
                lines.push(String::new());
            }
            lines.push("   Changes:".dimmed().to_string());
            render_operations(&reconciliation.operations, verbose, &mut lines);
        }

        lines.join("\n")
    }
}

fn render_operations(ops: &[SyncOperation], verbose: bool, lines: &mut Vec<String>) {
    if verbose || ops.len() <= COMPACT_THRESHOLD {
        lines.extend(ops.iter().map(|op| format!("   {}", op.render())));
        return;
    }

    let creates = ops
        .iter()
        .filter(|op| op.kind() == OperationKind::Create)
        .count();
    let deletes = ops.len() - creates;

    if creates > 0 {
        let label = format!("({} new {})", creates, pluralize("event", creates));
        lines.push(format!("   {} {}", "+".green(), label.green()));
    }
    if deletes > 0 {
        let label = format!("({} deleted {})", deletes, pluralize("event", deletes));
        lines.push(format!("   {} {}", "-".red(), label.red()));
    }
}

fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}
