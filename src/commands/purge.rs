use std::process::ExitCode;

use anyhow::Result;

use super::Runner;
use crate::render::Render;

pub async fn run(runner: &Runner) -> Result<ExitCode> {
    println!("{}", runner.current_window().render());

    let summary = runner.purge().await?;
    println!("{}", summary.render());

    Ok(if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
