//! Calendar sources
//!
//! The reminder scheduler only sees a [`CalendarPort`]; concrete sources live
//! in submodules.

pub mod google;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{CalendarError, UpcomingEvent};

pub use google::GoogleCalendar;

/// A remote calendar that can list upcoming events.
///
/// Implementations must bound their own latency (request timeouts) so that a
/// hung call cannot stall polling forever.
#[async_trait]
pub trait CalendarPort: Send + Sync {
    /// Events whose start falls between `window_start` and `window_end`,
    /// ordered by start time
    async fn list_upcoming_events(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<UpcomingEvent>, CalendarError>;
}
