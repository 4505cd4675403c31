use std::process::ExitCode;

use anyhow::Result;
use calsync_core::{SyncConfig, WindowProvider};
use owo_colors::OwoColorize;

use crate::render::Render;

pub fn run(config: &SyncConfig) -> Result<ExitCode> {
    let provider = config.window()?;
    let window = provider.current_window();
    let (start, end) = window.to_rfc3339(provider.timezone());

    println!("{}", window.render());
    println!("   {} {}", "timezone".dimmed(), provider.timezone());
    println!("   {} {} - {}", "utc".dimmed(), start, end);

    Ok(ExitCode::SUCCESS)
}
