//! Google Calendar as the calsync target store.
//!
//! Talks to the Calendar v3 REST API directly with `reqwest`, authenticating
//! as a service account.

mod auth;
mod convert;
mod store;
mod types;

pub use auth::{ServiceAccountKey, TokenSource};
pub use store::GoogleCalendarStore;
