//! Desktop notification service
//!
//! Sends desktop notifications using the freedesktop notification standard.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::NotificationsConfig;
use crate::{IndicatorEvent, Reminder};

/// Summary line used for calendar reminders
pub const REMINDER_SUMMARY: &str = "🐕 Calendar Reminder";

/// Service for sending desktop notifications
pub struct NotificationService {
    enabled: bool,
    timeout_ms: u32,
    sound_name: Option<String>,
}

impl NotificationService {
    /// Create a new notification service
    pub fn new(config: &NotificationsConfig) -> Self {
        Self {
            enabled: config.enabled,
            timeout_ms: config.timeout_ms,
            sound_name: Some(config.sound_name.clone()).filter(|name| !name.is_empty()),
        }
    }

    /// Send a desktop notification
    pub fn send(&self, title: &str, body: &str) {
        if !self.enabled {
            return;
        }

        if let Err(e) = self.build(title, body).show() {
            tracing::warn!("Failed to send notification: {}", e);
        }
    }

    fn build(&self, title: &str, body: &str) -> notify_rust::Notification {
        let timeout = if self.timeout_ms == 0 {
            notify_rust::Timeout::Never
        } else {
            notify_rust::Timeout::Milliseconds(self.timeout_ms)
        };

        let mut notification = notify_rust::Notification::new();
        notification
            .summary(title)
            .body(body)
            .icon("appointment-soon")
            .urgency(notify_rust::Urgency::Normal)
            .timeout(timeout);
        if let Some(ref sound_name) = self.sound_name {
            notification.sound_name(sound_name);
        }
        notification
    }

    /// Announce a calendar reminder
    pub fn send_reminder(&self, reminder: &Reminder) {
        self.send(REMINDER_SUMMARY, &reminder_body(reminder));
    }

    /// Present every reminder the indicator publishes
    pub fn spawn(self, mut events: broadcast::Receiver<IndicatorEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(IndicatorEvent::Reminder(reminder)) => self.send_reminder(&reminder),
                    Ok(IndicatorEvent::StateChanged(_)) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Notification service missed {} indicator events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

fn reminder_body(reminder: &Reminder) -> String {
    match reminder.event.location {
        Some(ref location) => format!("{}\n{}", reminder.message(), location),
        None => reminder.message(),
    }
}
