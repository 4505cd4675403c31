use std::process::ExitCode;

use anyhow::Result;
use calsync_core::{SyncOperation, SyncPlan, SyncSummary, SyncWindow};
use serde::Serialize;

use super::Runner;
use crate::render::{PlanRender, Render};
use crate::utils::tui;

#[derive(Serialize)]
struct Report<'a> {
    window: SyncWindow,
    dry_run: bool,
    source_events: usize,
    target_events: usize,
    operations: Vec<&'a SyncOperation>,
    cancellations_unmatched: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<SyncSummary>,
}

impl<'a> Report<'a> {
    fn new(plan: &'a SyncPlan, summary: Option<SyncSummary>) -> Self {
        Report {
            window: plan.window,
            dry_run: summary.is_none(),
            source_events: plan.source_count,
            target_events: plan.target_count,
            operations: plan.reconciliation.all_operations().collect(),
            cancellations_unmatched: plan.reconciliation.cancellations.unmatched,
            summary,
        }
    }
}

pub async fn run(runner: &Runner, dry_run: bool, json: bool) -> Result<ExitCode> {
    let spinner = (!json).then(|| tui::create_spinner("Fetching events".to_string()));
    let plan = runner.plan().await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let plan = plan?;

    if !json {
        println!("{}", plan.window.render());
        println!("{}", plan.render(true));
    }

    if dry_run {
        if json {
            println!("{}", serde_json::to_string_pretty(&Report::new(&plan, None))?);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let summary = runner.apply(&plan).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&Report::new(&plan, Some(summary)))?
        );
    } else {
        println!();
        println!("{}", summary.render());
    }

    Ok(if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
