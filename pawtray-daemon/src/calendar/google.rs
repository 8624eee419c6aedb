//! Google Calendar source using the Calendar v3 REST API
//!
//! Only reads events. The OAuth access token is expected in a JSON file with an
//! `access_token` field; obtaining and refreshing it is someone else's job.

use std::path::PathBuf;
use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Deserialize;

use crate::config::CalendarConfig;
use crate::{CalendarError, UpcomingEvent};
use super::CalendarPort;

const API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Response from the events.list endpoint
#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    items: Vec<GoogleEvent>,
}

#[derive(Debug, Deserialize)]
struct GoogleEvent {
    id: Option<String>,
    summary: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
    location: Option<String>,
}

/// Either a timed start (`dateTime`) or an all-day date (`date`)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<String>,
    date: Option<String>,
}

impl EventTime {
    fn resolve(&self) -> Option<DateTime<Utc>> {
        if let Some(ref date_time) = self.date_time {
            return DateTime::parse_from_rfc3339(date_time)
                .ok()
                .map(|dt| dt.with_timezone(&Utc));
        }

        // All-day events start at midnight UTC
        let date = NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc())
    }
}

impl TryFrom<GoogleEvent> for UpcomingEvent {
    type Error = CalendarError;

    fn try_from(event: GoogleEvent) -> Result<Self, Self::Error> {
        let id = match event.id {
            Some(id) if !id.is_empty() => id,
            _ => {
                return Err(CalendarError::MalformedEvent {
                    id: "<none>".to_string(),
                    reason: "missing id".to_string(),
                })
            }
        };

        let start = event
            .start
            .as_ref()
            .and_then(EventTime::resolve)
            .ok_or_else(|| CalendarError::MalformedEvent {
                id: id.clone(),
                reason: "missing or unparseable start time".to_string(),
            })?;
        let end = event.end.as_ref().and_then(EventTime::resolve).unwrap_or(start);

        Ok(UpcomingEvent {
            id,
            title: event.summary.unwrap_or_else(|| "No title".to_string()),
            start,
            end,
            location: event.location.filter(|l| !l.is_empty()),
        })
    }
}

/// Token file contents
#[derive(Debug, Deserialize)]
struct StoredToken {
    access_token: String,
}

/// Reads upcoming events from one Google calendar
pub struct GoogleCalendar {
    http_client: reqwest::Client,
    calendar_id: String,
    token_path: PathBuf,
    max_results: u32,
}

impl GoogleCalendar {
    pub fn new(config: &CalendarConfig) -> Result<Self, CalendarError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                CalendarError::SourceUnavailable(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            calendar_id: config.calendar_id.clone(),
            token_path: config.token_path(),
            max_results: config.max_results,
        })
    }

    /// Build the events.list URL for a time window
    fn build_url(&self, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> String {
        format!(
            "{}/calendars/{}/events?timeMin={}&timeMax={}&maxResults={}&singleEvents=true&orderBy=startTime",
            API_BASE,
            urlencoding::encode(&self.calendar_id),
            urlencoding::encode(&window_start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            urlencoding::encode(&window_end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            self.max_results
        )
    }

    async fn access_token(&self) -> Result<String, CalendarError> {
        let content = tokio::fs::read_to_string(&self.token_path).await.map_err(|e| {
            CalendarError::SourceUnavailable(format!(
                "Failed to read token file {:?}: {}",
                self.token_path, e
            ))
        })?;

        let token: StoredToken = serde_json::from_str(&content).map_err(|e| {
            CalendarError::SourceUnavailable(format!(
                "Invalid token file {:?}: {}",
                self.token_path, e
            ))
        })?;

        Ok(token.access_token)
    }
}

/// Convert a decoded response, dropping events that cannot be used.
///
/// `timeMin` filters on the end time, so events that are already running come
/// back too; only events starting at or after `window_start` are kept.
fn collect_events(response: EventsResponse, window_start: DateTime<Utc>) -> Vec<UpcomingEvent> {
    response
        .items
        .into_iter()
        .filter_map(|item| match UpcomingEvent::try_from(item) {
            Ok(event) if event.start >= window_start => Some(event),
            Ok(event) => {
                tracing::trace!("Skipping event {:?}, already started", event.id);
                None
            }
            Err(e) => {
                tracing::warn!("Dropping calendar event: {}", e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl CalendarPort for GoogleCalendar {
    async fn list_upcoming_events(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<UpcomingEvent>, CalendarError> {
        let token = self.access_token().await?;
        let url = self.build_url(window_start, window_end);
        tracing::debug!("Fetching calendar events from: {}", url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                let msg = if e.is_connect() {
                    "Network unavailable".to_string()
                } else if e.is_timeout() {
                    "Request timed out".to_string()
                } else {
                    format!("Failed to fetch events: {}", e)
                };
                CalendarError::SourceUnavailable(msg)
            })?;

        if !response.status().is_success() {
            return Err(CalendarError::SourceUnavailable(format!(
                "Calendar API returned status: {}",
                response.status()
            )));
        }

        let body = response
            .json::<EventsResponse>()
            .await
            .map_err(|e| CalendarError::Malformed(e.to_string()))?;

        Ok(collect_events(body, window_start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(json: &str) -> Vec<UpcomingEvent> {
        let window_start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        collect_events(serde_json::from_str(json).unwrap(), window_start)
    }

    #[test]
    fn test_parse_timed_and_all_day_events() {
        let events = parse(
            r#"{
                "kind": "calendar#events",
                "items": [
                    {
                        "id": "abc",
                        "summary": "Standup",
                        "location": "Room 4",
                        "start": {"dateTime": "2024-05-01T09:30:00+02:00"},
                        "end": {"dateTime": "2024-05-01T09:45:00+02:00"}
                    },
                    {
                        "id": "holiday",
                        "start": {"date": "2024-05-02"},
                        "end": {"date": "2024-05-03"}
                    }
                ]
            }"#,
        );

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, "abc");
        assert_eq!(events[0].title, "Standup");
        assert_eq!(events[0].start, Utc.with_ymd_and_hms(2024, 5, 1, 7, 30, 0).unwrap());
        assert_eq!(events[0].end, Utc.with_ymd_and_hms(2024, 5, 1, 7, 45, 0).unwrap());
        assert_eq!(events[0].location.as_deref(), Some("Room 4"));

        assert_eq!(events[1].title, "No title");
        assert_eq!(events[1].start, Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap());
        assert_eq!(events[1].location, None);
    }

    #[test]
    fn test_malformed_events_are_dropped() {
        let events = parse(
            r#"{
                "items": [
                    {"summary": "No id", "start": {"dateTime": "2024-05-01T09:30:00Z"}},
                    {"id": "no-start", "summary": "Floating"},
                    {"id": "bad-start", "start": {"dateTime": "tomorrow"}},
                    {"id": "ok", "start": {"dateTime": "2024-05-01T09:30:00Z"}}
                ]
            }"#,
        );

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "ok");
        // Missing end falls back to the start
        assert_eq!(events[0].end, events[0].start);
    }

    #[test]
    fn test_running_events_are_dropped() {
        let response = serde_json::from_str(
            r#"{
                "items": [
                    {
                        "id": "running",
                        "start": {"dateTime": "2024-05-01T08:30:00Z"},
                        "end": {"dateTime": "2024-05-01T10:00:00Z"}
                    },
                    {
                        "id": "starting-now",
                        "start": {"dateTime": "2024-05-01T09:00:00Z"}
                    },
                    {
                        "id": "soon",
                        "start": {"dateTime": "2024-05-01T09:10:00Z"}
                    }
                ]
            }"#,
        )
        .unwrap();
        let window_start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

        let ids: Vec<_> = collect_events(response, window_start)
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, ["starting-now", "soon"]);
    }

    #[test]
    fn test_empty_response() {
        assert!(parse("{}").is_empty());
    }

    #[test]
    fn test_build_url() {
        let config = CalendarConfig {
            calendar_id: "team@example.com".to_string(),
            ..CalendarConfig::default()
        };
        let calendar = GoogleCalendar::new(&config).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let url = calendar.build_url(start, start + chrono::Duration::hours(24));

        assert_eq!(
            url,
            "https://www.googleapis.com/calendar/v3/calendars/team%40example.com/events\
             ?timeMin=2024-05-01T09%3A00%3A00Z&timeMax=2024-05-02T09%3A00%3A00Z\
             &maxResults=10&singleEvents=true&orderBy=startTime"
        );
    }

    #[tokio::test]
    async fn test_missing_token_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = CalendarConfig {
            token_path: Some(dir.path().join("token.json")),
            ..CalendarConfig::default()
        };
        let calendar = GoogleCalendar::new(&config).unwrap();
        let now = Utc::now();

        let result = calendar
            .list_upcoming_events(now, now + chrono::Duration::hours(1))
            .await;
        assert!(matches!(result, Err(CalendarError::SourceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_reads_access_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"access_token": "ya29.token", "expiry_date": 1}"#).unwrap();
        let config = CalendarConfig {
            token_path: Some(path),
            ..CalendarConfig::default()
        };
        let calendar = GoogleCalendar::new(&config).unwrap();

        assert_eq!(calendar.access_token().await.unwrap(), "ya29.token");
    }
}
