//! PawTray Daemon Library
//!
//! This library provides the core types and functionality for the PawTray daemon.
//! It keeps a small status indicator in sync with user activity and raises
//! deduplicated reminders as calendar events approach.

pub mod activity;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod dbus_service;
pub mod error;
pub mod indicator;
pub mod notifications;
pub mod reminders;

pub use error::{CalendarError, Error};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The display state of the indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IndicatorState {
    /// Nothing is happening
    #[default]
    Idle,
    /// The user was recently active
    Active,
    /// A calendar reminder is being shown
    Alert,
}

impl IndicatorState {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Some(IndicatorState::Idle),
            "active" => Some(IndicatorState::Active),
            "alert" => Some(IndicatorState::Alert),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorState::Idle => "idle",
            IndicatorState::Active => "active",
            IndicatorState::Alert => "alert",
        }
    }

    /// Default text glyph for renderers that have no images
    pub fn glyph(&self) -> &'static str {
        match self {
            IndicatorState::Idle => "🐕",
            IndicatorState::Active => "🏃🐕",
            IndicatorState::Alert => "⏰🐕",
        }
    }
}

impl std::fmt::Display for IndicatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A calendar event as returned by a [`calendar::CalendarPort`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcomingEvent {
    /// Opaque identifier assigned by the calendar
    pub id: String,
    /// Event title
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
}

impl UpcomingEvent {
    /// Whole minutes until the event starts, rounded down.
    ///
    /// Events that already started yield zero or a negative number.
    pub fn minutes_until(&self, now: DateTime<Utc>) -> i64 {
        (self.start - now).num_milliseconds().div_euclid(60_000)
    }
}

/// A one-time notice that an event starts soon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub event: UpcomingEvent,
    pub minutes_until: u32,
}

impl Reminder {
    pub fn message(&self) -> String {
        reminder_message(&self.event.title, self.minutes_until)
    }
}

/// Human readable reminder text, e.g. "Standup starts in 1 minute"
pub fn reminder_message(title: &str, minutes_until: u32) -> String {
    format!(
        "{} starts in {} minute{}",
        title,
        minutes_until,
        if minutes_until == 1 { "" } else { "s" }
    )
}

/// Events published by the indicator controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorEvent {
    /// The current state changed to the given value
    StateChanged(IndicatorState),
    /// A reminder was accepted and should be presented
    Reminder(Reminder),
}

/// D-Bus well-known names and paths
pub mod dbus {
    /// PawTray daemon well-known name
    pub const DAEMON_BUS_NAME: &str = "org.pawtray.Daemon";
    /// PawTray daemon object path
    pub const DAEMON_OBJECT_PATH: &str = "/org/pawtray/Daemon";
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event_at(start: DateTime<Utc>) -> UpcomingEvent {
        UpcomingEvent {
            id: "e1".to_string(),
            title: "Standup".to_string(),
            start,
            end: start + chrono::Duration::minutes(15),
            location: None,
        }
    }

    #[test]
    fn test_minutes_until_rounds_down() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let event = event_at(now + chrono::Duration::seconds(10 * 60 + 59));
        assert_eq!(event.minutes_until(now), 10);

        let event = event_at(now + chrono::Duration::seconds(59));
        assert_eq!(event.minutes_until(now), 0);

        // Already started a few seconds ago
        let event = event_at(now - chrono::Duration::seconds(5));
        assert_eq!(event.minutes_until(now), -1);
    }

    #[test]
    fn test_reminder_message_pluralization() {
        assert_eq!(reminder_message("Standup", 1), "Standup starts in 1 minute");
        assert_eq!(reminder_message("Standup", 12), "Standup starts in 12 minutes");
    }

    #[test]
    fn test_state_names() {
        for state in [IndicatorState::Idle, IndicatorState::Active, IndicatorState::Alert] {
            assert_eq!(IndicatorState::parse(state.as_str()), Some(state));
        }
        assert_eq!(IndicatorState::parse("ALERT"), Some(IndicatorState::Alert));
        assert_eq!(IndicatorState::parse("running"), None);
        assert_eq!(IndicatorState::default(), IndicatorState::Idle);
    }
}
