use std::time::Duration;

use async_trait::async_trait;
use calsync_core::ics::parse_calendar;
use calsync_core::{
    CalSyncError, CalSyncResult, Normalizer, RawEvent, RetryPolicy, SourceFeed, SyncConfig,
    SyncWindow, recurrence,
};
use chrono_tz::Tz;
use reqwest::Client;
use tracing::{debug, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads a published calendar and expands it into window-clipped events.
pub struct TeamsIcsFeed {
    client: Client,
    url: String,
    normalizer: Normalizer,
    retry: RetryPolicy,
}

impl TeamsIcsFeed {
    pub fn new(client: Client, url: impl Into<String>, tz: Tz) -> Self {
        TeamsIcsFeed {
            client,
            url: normalize_url(url.into()),
            normalizer: Normalizer::new(tz),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn from_config(config: &SyncConfig) -> CalSyncResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("calsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(transport)?;

        Ok(TeamsIcsFeed::new(client, config.teams_ics_url()?, config.timezone()?)
            .with_retry(config.retry_policy()?))
    }

    async fn download(&self) -> CalSyncResult<String> {
        debug!("GET {}", self.url);
        let response = self.client.get(&self.url).send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CalSyncError::Api {
                status: status.as_u16(),
                message,
            });
        }
        response.text().await.map_err(transport)
    }
}

#[async_trait]
impl SourceFeed for TeamsIcsFeed {
    async fn fetch_events(&self, window: &SyncWindow) -> CalSyncResult<Vec<RawEvent>> {
        let body = self.retry.run("fetch ICS feed", || self.download()).await?;
        let parsed = parse_calendar(&body)?;
        let events = recurrence::expand(&parsed, window, &self.normalizer);

        info!(
            "Feed had {} VEVENT(s), {} event(s) in window",
            parsed.len(),
            events.len()
        );
        Ok(events)
    }
}

/// Subscription links are often shared with the `webcal` scheme.
fn normalize_url(url: String) -> String {
    match url.strip_prefix("webcal://") {
        Some(rest) => format!("https://{}", rest),
        None => url,
    }
}

fn transport(err: reqwest::Error) -> CalSyncError {
    CalSyncError::Transport(err.to_string())
}
