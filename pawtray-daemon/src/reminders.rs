//! Reminder scheduler
//!
//! Polls a [`CalendarPort`] on a fixed interval and emits a [`Reminder`] the
//! first time an event comes within the reminder threshold. Reminded event ids
//! are remembered for a fixed retention window so that later polls don't fire
//! again for the same event.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;

use crate::calendar::CalendarPort;
use crate::clock::Clock;
use crate::config::{RemindersConfig, MAX_LOOKAHEAD_HOURS, MAX_PERIOD_SECS};
use crate::error::{Error, Result};
use crate::{CalendarError, Reminder, UpcomingEvent};

/// Timing parameters for the scheduler
#[derive(Debug, Clone)]
pub struct ReminderSettings {
    /// Time between periodic polls
    pub poll_interval: Duration,
    /// How far ahead of now to query
    pub lookahead: chrono::Duration,
    /// Remind when an event is at most this many whole minutes away
    pub threshold_minutes: u32,
    /// How long a reminded id stays suppressed
    pub retention: Duration,
}

impl From<&RemindersConfig> for ReminderSettings {
    fn from(config: &RemindersConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs.min(MAX_PERIOD_SECS)),
            lookahead: chrono::Duration::hours(config.lookahead_hours.min(MAX_LOOKAHEAD_HOURS) as i64),
            threshold_minutes: config.threshold_minutes,
            retention: Duration::from_secs(
                config.retention_minutes.saturating_mul(60).min(MAX_PERIOD_SECS),
            ),
        }
    }
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self::from(&RemindersConfig::default())
    }
}

/// Threshold selection plus the set of already reminded event ids
#[derive(Debug)]
pub struct ReminderTracker {
    threshold_minutes: u32,
    notified: HashMap<String, DateTime<Utc>>,
}

impl ReminderTracker {
    pub fn new(threshold_minutes: u32) -> Self {
        Self {
            threshold_minutes,
            notified: HashMap::new(),
        }
    }

    /// Pick the events that are due for a reminder and mark them as notified.
    ///
    /// An event is due when `0 < minutes_until <= threshold` and its id has not
    /// been reminded within the retention window.
    pub fn evaluate(&mut self, events: &[UpcomingEvent], now: DateTime<Utc>) -> Vec<Reminder> {
        let mut due = Vec::new();

        for event in events {
            let minutes_until = event.minutes_until(now);
            if minutes_until <= 0 || minutes_until > i64::from(self.threshold_minutes) {
                continue;
            }

            if self.notified.contains_key(&event.id) {
                tracing::trace!("Already reminded about {:?}", event.id);
                continue;
            }

            self.notified.insert(event.id.clone(), now);
            due.push(Reminder {
                event: event.clone(),
                minutes_until: minutes_until as u32,
            });
        }

        due
    }

    /// Forget a reminded id. Returns false if it was not present.
    pub fn evict(&mut self, id: &str) -> bool {
        self.notified.remove(id).is_some()
    }

    #[cfg(test)]
    fn notified_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.notified.get(id).copied()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.notified.len()
    }

    pub fn clear(&mut self) {
        self.notified.clear();
    }
}

/// Which kind of query produced a poll result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollKind {
    /// Regular poll; every returned event is considered
    Periodic,
    /// One-shot check; only the nearest event is considered
    NextOnly,
}

type PollOutcome = (PollKind, std::result::Result<Vec<UpcomingEvent>, CalendarError>);

#[derive(Debug)]
enum SchedulerCommand {
    CheckNext,
}

/// Polls a calendar and publishes reminders
pub struct ReminderScheduler {
    port: Arc<dyn CalendarPort>,
    clock: Arc<dyn Clock>,
    settings: ReminderSettings,
    reminders: broadcast::Sender<Reminder>,
}

impl ReminderScheduler {
    pub fn new(port: Arc<dyn CalendarPort>, clock: Arc<dyn Clock>, settings: ReminderSettings) -> Self {
        let (reminders, _) = broadcast::channel(64);
        Self {
            port,
            clock,
            settings,
            reminders,
        }
    }

    /// Subscribe to reminders. Subscribe before [`start`](Self::start) to
    /// observe the result of the immediate first poll.
    pub fn subscribe(&self) -> broadcast::Receiver<Reminder> {
        self.reminders.subscribe()
    }

    /// Start polling: one poll right away, then one every poll interval
    pub fn start(self) -> (SchedulerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tracing::info!(
            "Reminder scheduler starting, polling every {:?}",
            self.settings.poll_interval
        );

        let task = SchedulerTask {
            tracker: ReminderTracker::new(self.settings.threshold_minutes),
            port: self.port,
            clock: self.clock,
            settings: self.settings,
            reminders: self.reminders.clone(),
            commands: command_rx,
            cancel: cancel.clone(),
            in_flight: JoinSet::new(),
            evictions: DelayQueue::new(),
        };
        let join = tokio::spawn(task.run());

        let handle = SchedulerHandle {
            commands: command_tx,
            reminders: self.reminders,
            cancel,
        };
        (handle, join)
    }
}

/// Handle for a running [`ReminderScheduler`]
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<SchedulerCommand>,
    reminders: broadcast::Sender<Reminder>,
    cancel: CancellationToken,
}

impl SchedulerHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<Reminder> {
        self.reminders.subscribe()
    }

    /// Run a one-shot check of the nearest upcoming event
    pub fn check_next(&self) -> Result<()> {
        self.commands
            .send(SchedulerCommand::CheckNext)
            .map_err(|_| Error::TimerFault("reminder scheduler is not running".to_string()))
    }

    /// Stop polling. Pending evictions are dropped and every remembered id is
    /// forgotten.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct SchedulerTask {
    port: Arc<dyn CalendarPort>,
    clock: Arc<dyn Clock>,
    settings: ReminderSettings,
    tracker: ReminderTracker,
    reminders: broadcast::Sender<Reminder>,
    commands: mpsc::UnboundedReceiver<SchedulerCommand>,
    cancel: CancellationToken,
    /// At most one poll at a time
    in_flight: JoinSet<PollOutcome>,
    evictions: DelayQueue<String>,
}

impl SchedulerTask {
    async fn run(mut self) {
        // The first tick completes immediately
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.begin_poll(PollKind::Periodic),
                Some(command) = self.commands.recv() => match command {
                    SchedulerCommand::CheckNext => self.begin_poll(PollKind::NextOnly),
                },
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.finish_poll(joined);
                }
                Some(expired) = self.evictions.next(), if !self.evictions.is_empty() => {
                    let id = expired.into_inner();
                    if self.tracker.evict(&id) {
                        tracing::debug!("Retention elapsed for {:?}", id);
                    }
                }
            }
        }

        self.shut_down();
        tracing::info!("Reminder scheduler stopped");
    }

    /// Drop the in-flight poll, pending evictions and every remembered id
    fn shut_down(&mut self) {
        self.in_flight.abort_all();
        self.evictions.clear();
        self.tracker.clear();
    }

    fn begin_poll(&mut self, kind: PollKind) {
        if !self.in_flight.is_empty() {
            tracing::debug!("Previous calendar poll still running, skipping {:?} poll", kind);
            return;
        }

        let now = self.clock.now();
        let window_end = now + self.settings.lookahead;
        let port = self.port.clone();

        self.in_flight.spawn(async move {
            (kind, port.list_upcoming_events(now, window_end).await)
        });
    }

    fn finish_poll(&mut self, joined: std::result::Result<PollOutcome, JoinError>) {
        let (kind, result) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Calendar poll task failed: {}", e);
                return;
            }
        };

        let events = match result {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("Calendar poll failed, skipping this cycle: {}", e);
                return;
            }
        };

        let now = self.clock.now();
        let candidates = match kind {
            PollKind::Periodic => events.as_slice(),
            // Events already under way can't be the next one
            PollKind::NextOnly => match events
                .iter()
                .filter(|e| e.start > now)
                .min_by_key(|e| e.start)
            {
                Some(nearest) => std::slice::from_ref(nearest),
                None => &[],
            },
        };

        for reminder in self.tracker.evaluate(candidates, now) {
            self.evictions
                .insert(reminder.event.id.clone(), self.settings.retention);

            tracing::info!("Calendar reminder: {}", reminder.message());
            // Ignore send errors (no subscribers)
            let _ = self.reminders.send(reminder);
        }
    }
}
