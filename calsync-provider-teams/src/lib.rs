//! Microsoft Teams calendar published as an ICS subscription, used as the
//! calsync source feed.

mod feed;

pub use feed::TeamsIcsFeed;
