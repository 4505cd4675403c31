//! Defaults shared by the config layer and the collaborators.

/// IANA zone used to compare events when none is configured.
pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";

/// Title prefix Teams puts on cancelled meetings.
pub const DEFAULT_CANCELLATION_PREFIX: &str = "Cancelado:";

/// First hour (local) of the sync window, on the Monday of the current week.
pub const DEFAULT_WINDOW_START_HOUR: u32 = 7;

/// Last hour (local) of the sync window, on its final day.
pub const DEFAULT_WINDOW_END_HOUR: u32 = 18;

/// Length of the sync window in days, counted from Monday.
pub const DEFAULT_WINDOW_DAYS: i64 = 11;

pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 8_000;
pub const DEFAULT_RETRY_JITTER: f64 = 0.2;

/// Upper bound accepted for `retry.max_attempts`.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const DEFAULT_GOOGLE_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
