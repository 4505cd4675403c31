pub mod config;
pub mod purge;
pub mod status;
pub mod sync;
pub mod window;

use anyhow::Result;
use calsync_core::{BusinessWeekWindow, SyncConfig, SyncRunner};
use calsync_provider_google::GoogleCalendarStore;
use calsync_provider_teams::TeamsIcsFeed;

pub type Runner = SyncRunner<TeamsIcsFeed, GoogleCalendarStore, BusinessWeekWindow>;

/// Validate the configuration and build both collaborators.
///
/// Nothing is fetched here, so a bad config fails before any network access.
pub fn connect(config: &SyncConfig) -> Result<Runner> {
    config.validate()?;
    let feed = TeamsIcsFeed::from_config(config)?;
    let store = GoogleCalendarStore::from_config(config)?;
    Ok(SyncRunner::from_config(config, feed, store)?)
}
