//! Run configuration.
//!
//! Layered with the `config` crate, lowest precedence first:
//! serde defaults, a TOML file, `CALSYNC_*` variables (`__` between nested
//! keys, e.g. `CALSYNC_WINDOW__DAYS`), then the bare variable names older
//! deployments used (`TEAMS_ICS_URL`, `GOOGLE_CALENDAR_ID`, ...).

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::cancellation::CancellationMarker;
use crate::constants::{
    DEFAULT_CANCELLATION_PREFIX, DEFAULT_GOOGLE_API_BASE, DEFAULT_LOG_LEVEL,
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_JITTER, DEFAULT_RETRY_MAX_ATTEMPTS,
    DEFAULT_RETRY_MAX_DELAY_MS, DEFAULT_TIMEZONE, DEFAULT_WINDOW_DAYS, DEFAULT_WINDOW_END_HOUR,
    DEFAULT_WINDOW_START_HOUR,
};
use crate::error::{CalSyncError, CalSyncResult};
use crate::normalize::Normalizer;
use crate::retry::RetryPolicy;
use crate::sync::SyncSettings;
use crate::window::BusinessWeekWindow;

const ENV_PREFIX: &str = "CALSYNC";

/// Schemes the feed can be fetched with; `webcal://` is read over https.
const FEED_SCHEMES: &[&str] = &["https://", "http://", "webcal://"];

/// Bare variable names and the keys they override.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("TEAMS_ICS_URL", "teams_ics_url"),
    ("GOOGLE_CALENDAR_ID", "google_calendar_id"),
    ("GOOGLE_SERVICE_ACCOUNT_KEY", "google_credentials"),
    ("GOOGLE_CREDENTIALS", "google_credentials"),
    ("LOG_LEVEL", "log_level"),
];

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_cancellation_prefix() -> String {
    DEFAULT_CANCELLATION_PREFIX.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_google_api_base() -> String {
    DEFAULT_GOOGLE_API_BASE.to_string()
}

#[derive(Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    #[serde(default)]
    pub teams_ics_url: Option<String>,

    #[serde(default)]
    pub google_calendar_id: Option<String>,

    /// Service-account key: the JSON itself, or a path to it.
    #[serde(default)]
    pub google_credentials: Option<String>,

    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_cancellation_prefix")]
    pub cancellation_prefix: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub window: WindowConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "default_google_api_base")]
    pub google_api_base: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub start_hour: u32,
    pub end_hour: u32,
    pub days: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            start_hour: DEFAULT_WINDOW_START_HOUR,
            end_hour: DEFAULT_WINDOW_END_HOUR,
            days: DEFAULT_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            jitter: DEFAULT_RETRY_JITTER,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            teams_ics_url: None,
            google_calendar_id: None,
            google_credentials: None,
            timezone: default_timezone(),
            cancellation_prefix: default_cancellation_prefix(),
            log_level: default_log_level(),
            window: WindowConfig::default(),
            retry: RetryConfig::default(),
            google_api_base: default_google_api_base(),
        }
    }
}

// Credentials never end up in logs.
impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("teams_ics_url", &self.teams_ics_url)
            .field("google_calendar_id", &self.google_calendar_id)
            .field(
                "google_credentials",
                &self.google_credentials.as_ref().map(|_| "<redacted>"),
            )
            .field("timezone", &self.timezone)
            .field("cancellation_prefix", &self.cancellation_prefix)
            .field("log_level", &self.log_level)
            .field("window", &self.window)
            .field("retry", &self.retry)
            .field("google_api_base", &self.google_api_base)
            .finish()
    }
}

impl SyncConfig {
    /// `~/.config/calsync/config.toml` (or the platform equivalent).
    pub fn default_path() -> CalSyncResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CalSyncError::Config("Could not determine config directory".into()))?
            .join("calsync");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from `path` (required) or the default path (optional), with the
    /// process environment on top.
    pub fn load(path: Option<&Path>) -> CalSyncResult<Self> {
        Self::load_from(path, std::env::vars().collect())
    }

    /// Like [`SyncConfig::load`], reading variables from `env` instead of the
    /// process environment.
    pub fn load_from(path: Option<&Path>, env: HashMap<String, String>) -> CalSyncResult<Self> {
        let file = match path {
            Some(path) => File::from(expand_path(path)).required(true),
            None => File::from(Self::default_path()?).required(false),
        };

        let mut builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone())),
        );

        for (var, key) in LEGACY_ENV {
            let value = env.get(*var).filter(|v| !v.trim().is_empty()).cloned();
            builder = builder
                .set_override_option(*key, value)
                .map_err(|e| CalSyncError::Config(e.to_string()))?;
        }

        builder
            .build()
            .map_err(|e| CalSyncError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalSyncError::Config(e.to_string()))
    }

    /// Check everything a run needs, reporting all problems at once.
    pub fn validate(&self) -> CalSyncResult<()> {
        let mut problems = Vec::new();

        match non_empty(&self.teams_ics_url) {
            None => problems.push("teams_ics_url is not set".to_string()),
            Some(url) if !FEED_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) => {
                problems.push(format!(
                    "teams_ics_url must be an http(s) or webcal URL, got '{url}'"
                ))
            }
            Some(_) => {}
        }
        if non_empty(&self.google_calendar_id).is_none() {
            problems.push("google_calendar_id is not set".to_string());
        }
        if non_empty(&self.google_credentials).is_none() {
            problems.push("google_credentials is not set".to_string());
        }
        if self.cancellation_prefix.trim().is_empty() {
            problems.push("cancellation_prefix must not be empty".to_string());
        }
        if let Err(e) = self.timezone() {
            problems.push(e.to_string());
        }
        if let Err(e) = self.window() {
            problems.push(e.to_string());
        }
        if let Err(e) = self.retry_policy() {
            problems.push(e.to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CalSyncError::Config(problems.join("; ")))
        }
    }

    pub fn timezone(&self) -> CalSyncResult<Tz> {
        self.timezone
            .trim()
            .parse::<Tz>()
            .map_err(|_| CalSyncError::InvalidTimezone(self.timezone.clone()))
    }

    pub fn marker(&self) -> CancellationMarker {
        CancellationMarker::new(self.cancellation_prefix.trim())
    }

    pub fn settings(&self) -> CalSyncResult<SyncSettings> {
        Ok(SyncSettings {
            normalizer: Normalizer::new(self.timezone()?),
            marker: self.marker(),
        })
    }

    pub fn window(&self) -> CalSyncResult<BusinessWeekWindow> {
        BusinessWeekWindow::new(
            self.timezone()?,
            self.window.start_hour,
            self.window.end_hour,
            self.window.days,
        )
    }

    pub fn retry_policy(&self) -> CalSyncResult<RetryPolicy> {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        )?
        .with_jitter_factor(self.retry.jitter)
    }

    pub fn teams_ics_url(&self) -> CalSyncResult<&str> {
        non_empty(&self.teams_ics_url)
            .ok_or_else(|| CalSyncError::Config("teams_ics_url is not set".into()))
    }

    pub fn google_calendar_id(&self) -> CalSyncResult<&str> {
        non_empty(&self.google_calendar_id)
            .ok_or_else(|| CalSyncError::Config("google_calendar_id is not set".into()))
    }

    /// The service-account key JSON, read from disk when configured as a path.
    pub fn credentials_json(&self) -> CalSyncResult<String> {
        let value = non_empty(&self.google_credentials)
            .ok_or_else(|| CalSyncError::Config("google_credentials is not set".into()))?;

        if value.starts_with('{') {
            return Ok(value.to_string());
        }

        let path = expand_path(Path::new(value));
        std::fs::read_to_string(&path).map_err(|e| {
            CalSyncError::Config(format!(
                "Could not read google_credentials from {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// TOML rendering with credentials masked.
    pub fn to_redacted_toml(&self) -> CalSyncResult<String> {
        let mut shown = self.clone();
        if shown.google_credentials.is_some() {
            shown.google_credentials = Some("<redacted>".into());
        }
        toml::to_string_pretty(&shown).map_err(|e| CalSyncError::Serialization(e.to_string()))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
