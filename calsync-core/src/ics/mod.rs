//! Reading the source feed's iCalendar body (RFC 5545).
//!
//! Only what reconciliation needs is kept: timing, title and the recurrence
//! properties consumed by `recurrence::expand`.

mod parse;

pub use parse::{IcsEvent, parse_calendar};
