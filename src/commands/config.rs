use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use calsync_core::SyncConfig;
use owo_colors::OwoColorize;

pub fn run(explicit: Option<&Path>, config: &SyncConfig) -> Result<ExitCode> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => SyncConfig::default_path()?,
    };
    let state = if path.exists() { "" } else { " (not found)" };

    println!("{}", "Paths".bold());
    println!("  Config:  {}{}", path.display(), state.dimmed());
    println!();
    println!("{}", "Effective settings".bold());
    println!("{}", config.to_redacted_toml()?);

    if let Err(e) = config.validate() {
        println!("{}", e.to_string().yellow());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
