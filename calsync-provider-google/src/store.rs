use std::time::Duration;

use async_trait::async_trait;
use calsync_core::constants::DEFAULT_GOOGLE_API_BASE;
use calsync_core::{
    CalSyncError, CalSyncResult, RawEvent, RetryPolicy, SyncConfig, SyncWindow, TargetStore,
};
use chrono::NaiveDateTime;
use chrono_tz::Tz;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, warn};

use crate::auth::{ServiceAccountKey, TokenSource};
use crate::convert::{from_google, new_event};
use crate::types::{CreatedEvent, EventsListResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: &str = "2500";

/// One Google calendar, read and written through the Calendar v3 API.
pub struct GoogleCalendarStore {
    client: Client,
    api_base: String,
    calendar_id: String,
    tz: Tz,
    tokens: TokenSource,
    retry: RetryPolicy,
}

impl GoogleCalendarStore {
    pub fn new(client: Client, calendar_id: impl Into<String>, tz: Tz, tokens: TokenSource) -> Self {
        GoogleCalendarStore {
            client,
            api_base: DEFAULT_GOOGLE_API_BASE.to_string(),
            calendar_id: calendar_id.into(),
            tz,
            tokens,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build a store authenticated as the configured service account.
    pub fn from_config(config: &SyncConfig) -> CalSyncResult<Self> {
        let key = ServiceAccountKey::from_json(&config.credentials_json()?)?;
        let client = http_client()?;
        let tokens = TokenSource::service_account(key, client.clone());

        Ok(GoogleCalendarStore::new(
            client,
            config.google_calendar_id()?,
            config.timezone()?,
            tokens,
        )
        .with_api_base(config.google_api_base.as_str())
        .with_retry(config.retry_policy()?))
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(&self.calendar_id)
        )
    }

    /// Send with a bearer token, refreshing it once if the API rejects it.
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> CalSyncResult<Response> {
        let token = self.tokens.access_token().await?;
        let response = build().bearer_auth(&token).send().await.map_err(transport)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("Access token rejected, requesting a new one");
        self.tokens.invalidate().await;
        let token = self.tokens.access_token().await?;
        build().bearer_auth(&token).send().await.map_err(transport)
    }

    async fn list_page(
        &self,
        time_min: &str,
        time_max: &str,
        page_token: Option<&str>,
    ) -> CalSyncResult<EventsListResponse> {
        let url = self.events_url();
        let response = self
            .send(|| {
                let mut request = self.client.get(&url).query(&[
                    ("timeMin", time_min),
                    ("timeMax", time_max),
                    ("singleEvents", "true"),
                    ("orderBy", "startTime"),
                    ("maxResults", PAGE_SIZE),
                ]);
                if let Some(token) = page_token {
                    request = request.query(&[("pageToken", token)]);
                }
                request
            })
            .await?;

        check(response)
            .await?
            .json()
            .await
            .map_err(|e| CalSyncError::Serialization(format!("Unreadable event list: {}", e)))
    }

    async fn insert(
        &self,
        title: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> CalSyncResult<String> {
        let url = self.events_url();
        let body = new_event(title, start, end, self.tz);
        let response = self
            .send(|| {
                self.client
                    .post(&url)
                    .query(&[("sendUpdates", "none")])
                    .json(&body)
            })
            .await?;

        let created: CreatedEvent = check(response)
            .await?
            .json()
            .await
            .map_err(|e| CalSyncError::Serialization(format!("Unreadable insert response: {}", e)))?;
        Ok(created.id)
    }

    async fn remove(&self, id: &str) -> CalSyncResult<()> {
        let url = format!("{}/{}", self.events_url(), urlencoding::encode(id));
        let response = self
            .send(|| {
                self.client
                    .delete(&url)
                    .query(&[("sendUpdates", "none")])
            })
            .await?;

        // Already gone is as good as deleted.
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
            debug!("Event {} was already deleted", id);
            return Ok(());
        }
        check(response).await.map(|_| ())
    }
}

#[async_trait]
impl TargetStore for GoogleCalendarStore {
    async fn list_events(&self, window: &SyncWindow) -> CalSyncResult<Vec<RawEvent>> {
        let (time_min, time_max) = window.to_rfc3339(self.tz);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .retry
                .run("list Google events", || {
                    self.list_page(&time_min, &time_max, page_token.as_deref())
                })
                .await?;
            debug!("Fetched page with {} event(s)", page.items.len());

            for item in page.items {
                match from_google(item) {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => {}
                    Err(e) => warn!("Skipping Google event: {}", e),
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        info!("Listed {} event(s) from Google calendar", events.len());
        Ok(events)
    }

    async fn create_event(
        &self,
        title: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> CalSyncResult<String> {
        self.retry
            .run("create Google event", || self.insert(title, start, end))
            .await
    }

    async fn delete_event(&self, id: &str) -> CalSyncResult<()> {
        self.retry
            .run("delete Google event", || self.remove(id))
            .await
    }
}

fn http_client() -> CalSyncResult<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("calsync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(transport)
}

fn transport(err: reqwest::Error) -> CalSyncError {
    CalSyncError::Transport(err.to_string())
}

async fn check(response: Response) -> CalSyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(CalSyncError::Api {
        status: status.as_u16(),
        message,
    })
}
