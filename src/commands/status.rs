use std::process::ExitCode;

use anyhow::Result;
use owo_colors::OwoColorize;

use super::Runner;
use crate::render::{PlanRender, Render};
use crate::utils::tui;

pub async fn run(runner: &Runner, verbose: bool) -> Result<ExitCode> {
    let window = runner.current_window();
    let spinner = tui::create_spinner(window.render());
    let result = runner.plan().await;
    spinner.finish_and_clear();

    println!("{}", window.render());
    match result {
        Ok(plan) => {
            println!("{}", plan.render(verbose));
            println!(
                "{}",
                format!(
                    "   {} source event(s), {} in Google",
                    plan.source_count, plan.target_count
                )
                .dimmed()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("   {}", e.to_string().red());
            Ok(ExitCode::FAILURE)
        }
    }
}
