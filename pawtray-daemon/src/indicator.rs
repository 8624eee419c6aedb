//! Indicator state controller
//!
//! Owns the current [`IndicatorState`] and applies activity and reminder
//! signals to it. The transition rules live in [`IndicatorMachine`], which is
//! driven by explicit instants; [`IndicatorController`] runs the machine on a
//! single task, feeding it commands in arrival order and waking it when a
//! countdown elapses.
//!
//! | From        | Event          | To     |
//! |-------------|----------------|--------|
//! | Idle        | activity       | Active |
//! | Active      | activity       | Active (countdown restarted) |
//! | Active      | active expiry  | Idle   |
//! | Idle/Active | reminder       | Alert  |
//! | Alert       | activity       | Alert (ignored) |
//! | Alert       | reminder       | Alert (countdown restarted) |
//! | Alert       | alert expiry   | Idle   |

use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::IndicatorConfig;
use crate::error::{Error, Result};
use crate::{IndicatorEvent, IndicatorState, Reminder};

/// A cancellable one-shot deadline. Restarting replaces the previous deadline.
#[derive(Debug, Clone, Copy, Default)]
struct Countdown {
    deadline: Option<Instant>,
}

impl Countdown {
    fn restart(&mut self, now: Instant, period: Duration) {
        self.deadline = Some(now + period);
    }

    fn cancel(&mut self) {
        self.deadline = None;
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if now >= deadline)
    }
}

/// The indicator transition table
#[derive(Debug)]
pub struct IndicatorMachine {
    state: IndicatorState,
    active_for: Duration,
    alert_for: Duration,
    active: Countdown,
    alert: Countdown,
}

impl IndicatorMachine {
    pub fn new(active_for: Duration, alert_for: Duration) -> Self {
        Self {
            state: IndicatorState::Idle,
            active_for,
            alert_for,
            active: Countdown::default(),
            alert: Countdown::default(),
        }
    }

    pub fn state(&self) -> IndicatorState {
        self.state
    }

    /// Apply one activity edge. Returns the new state if it changed.
    ///
    /// Activity during an alert is swallowed: it neither changes the state
    /// nor arms the active countdown.
    pub fn activity(&mut self, now: Instant) -> Option<IndicatorState> {
        match self.state {
            IndicatorState::Alert => None,
            IndicatorState::Idle | IndicatorState::Active => {
                self.active.restart(now, self.active_for);
                self.set(IndicatorState::Active)
            }
        }
    }

    /// Enter the alert state, discarding any pending active countdown.
    /// A reminder during an alert restarts the alert countdown.
    pub fn reminder(&mut self, now: Instant) -> Option<IndicatorState> {
        self.active.cancel();
        self.alert.restart(now, self.alert_for);
        self.set(IndicatorState::Alert)
    }

    /// Fire the countdown of the current state if it has elapsed.
    ///
    /// Alert expiry always returns to idle, even if there was activity
    /// during the alert.
    pub fn expire(&mut self, now: Instant) -> Option<IndicatorState> {
        match self.state {
            IndicatorState::Active if self.active.is_expired(now) => {
                self.active.cancel();
                self.set(IndicatorState::Idle)
            }
            IndicatorState::Alert if self.alert.is_expired(now) => {
                self.alert.cancel();
                self.set(IndicatorState::Idle)
            }
            _ => None,
        }
    }

    /// When [`expire`](Self::expire) next needs to run, if ever
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            IndicatorState::Idle => None,
            IndicatorState::Active => self.active.deadline,
            IndicatorState::Alert => self.alert.deadline,
        }
    }

    fn set(&mut self, next: IndicatorState) -> Option<IndicatorState> {
        if self.state == next {
            return None;
        }
        self.state = next;
        Some(next)
    }
}

#[derive(Debug)]
enum Command {
    Activity,
    Reminder(Reminder),
    Shutdown,
}

/// Handle for talking to a running [`IndicatorController`]
#[derive(Debug, Clone)]
pub struct IndicatorHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<IndicatorEvent>,
    state: watch::Receiver<IndicatorState>,
}

impl IndicatorHandle {
    /// Record one activity edge
    pub fn report_activity(&self) -> Result<()> {
        self.send(Command::Activity)
    }

    /// Switch to the alert state and publish the reminder to subscribers
    pub fn report_reminder(&self, reminder: Reminder) -> Result<()> {
        self.send(Command::Reminder(reminder))
    }

    /// The state as of the last processed command or expiry
    pub fn current_state(&self) -> IndicatorState {
        *self.state.borrow()
    }

    /// Subscribe to state changes and reminders
    pub fn subscribe(&self) -> broadcast::Receiver<IndicatorEvent> {
        self.events.subscribe()
    }

    /// Stop the controller task
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::TimerFault("indicator controller is not running".to_string()))
    }
}

/// Runs an [`IndicatorMachine`] on its own task
pub struct IndicatorController {
    machine: IndicatorMachine,
    commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<IndicatorEvent>,
    state: watch::Sender<IndicatorState>,
}

impl IndicatorController {
    /// Start a controller in the idle state
    pub fn spawn(config: &IndicatorConfig) -> (IndicatorHandle, JoinHandle<()>) {
        Self::spawn_with(config.active_duration(), config.alert_duration())
    }

    pub fn spawn_with(active_for: Duration, alert_for: Duration) -> (IndicatorHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(64);
        let (state_tx, state_rx) = watch::channel(IndicatorState::Idle);

        let controller = Self {
            machine: IndicatorMachine::new(active_for, alert_for),
            commands: command_rx,
            events: event_tx.clone(),
            state: state_tx,
        };
        let task = tokio::spawn(controller.run());

        let handle = IndicatorHandle {
            commands: command_tx,
            events: event_tx,
            state: state_rx,
        };
        (handle, task)
    }

    async fn run(mut self) {
        loop {
            let deadline = self.machine.next_deadline();

            tokio::select! {
                command = self.commands.recv() => {
                    // Settle overdue countdowns first so transitions stay in time order
                    let now = Instant::now();
                    self.expire(now);

                    match command {
                        Some(Command::Activity) => {
                            let changed = self.machine.activity(now);
                            self.publish(changed);
                        }
                        Some(Command::Reminder(reminder)) => {
                            tracing::info!(
                                "Reminder for {:?}: {}",
                                reminder.event.id,
                                reminder.message()
                            );
                            let changed = self.machine.reminder(now);
                            self.publish(changed);
                            let _ = self.events.send(IndicatorEvent::Reminder(reminder));
                        }
                        Some(Command::Shutdown) | None => break,
                    }
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.expire(Instant::now());
                }
            }
        }

        tracing::debug!("Indicator controller stopped");
    }

    fn expire(&mut self, now: Instant) {
        let changed = self.machine.expire(now);
        self.publish(changed);
    }

    fn publish(&self, changed: Option<IndicatorState>) {
        if let Some(state) = changed {
            tracing::debug!("Indicator state -> {}", state);
            self.state.send_replace(state);
            // Ignore send errors (no subscribers)
            let _ = self.events.send(IndicatorEvent::StateChanged(state));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UpcomingEvent;
    use chrono::Utc;

    const ACTIVE: Duration = Duration::from_secs(3);
    const ALERT: Duration = Duration::from_secs(30);

    fn machine() -> IndicatorMachine {
        IndicatorMachine::new(ACTIVE, ALERT)
    }

    fn reminder(id: &str) -> Reminder {
        let start = Utc::now() + chrono::Duration::minutes(10);
        Reminder {
            event: UpcomingEvent {
                id: id.to_string(),
                title: "Standup".to_string(),
                start,
                end: start + chrono::Duration::minutes(15),
                location: None,
            },
            minutes_until: 10,
        }
    }

    #[test]
    fn test_activity_reverts_after_active_period() {
        let t0 = Instant::now();
        let mut m = machine();

        assert_eq!(m.activity(t0), Some(IndicatorState::Active));
        assert_eq!(m.expire(t0 + ACTIVE - Duration::from_millis(1)), None);
        assert_eq!(m.state(), IndicatorState::Active);
        assert_eq!(m.expire(t0 + ACTIVE), Some(IndicatorState::Idle));
        assert_eq!(m.next_deadline(), None);
    }

    #[test]
    fn test_activity_burst_resets_countdown_from_last_edge() {
        let t0 = Instant::now();
        let mut m = machine();

        assert_eq!(m.activity(t0), Some(IndicatorState::Active));
        // Repeated edges do not re-announce the state
        assert_eq!(m.activity(t0 + Duration::from_secs(1)), None);
        assert_eq!(m.activity(t0 + Duration::from_secs(2)), None);

        let last = t0 + Duration::from_secs(2);
        assert_eq!(m.next_deadline(), Some(last + ACTIVE));
        assert_eq!(m.expire(t0 + ACTIVE), None);
        assert_eq!(m.expire(last + ACTIVE - Duration::from_millis(1)), None);
        assert_eq!(m.expire(last + ACTIVE), Some(IndicatorState::Idle));
    }

    #[test]
    fn test_reminder_preempts_active_countdown() {
        let t0 = Instant::now();
        let mut m = machine();

        m.activity(t0);
        // One second left on the active countdown
        let at = t0 + Duration::from_secs(2);
        assert_eq!(m.reminder(at), Some(IndicatorState::Alert));

        // The abandoned active deadline passes without effect
        assert_eq!(m.expire(t0 + ACTIVE), None);
        assert_eq!(m.state(), IndicatorState::Alert);
        assert_eq!(m.next_deadline(), Some(at + ALERT));
        assert_eq!(m.expire(at + ALERT), Some(IndicatorState::Idle));
    }

    #[test]
    fn test_activity_ignored_during_alert() {
        let t0 = Instant::now();
        let mut m = machine();

        m.reminder(t0);
        for secs in [1, 5, 29] {
            assert_eq!(m.activity(t0 + Duration::from_secs(secs)), None);
            assert_eq!(m.state(), IndicatorState::Alert);
        }
        assert_eq!(m.next_deadline(), Some(t0 + ALERT));
    }

    #[test]
    fn test_alert_expiry_returns_to_idle_despite_activity() {
        // Activity during the alert is not remembered; expiry lands on idle
        let t0 = Instant::now();
        let mut m = machine();

        m.reminder(t0);
        m.activity(t0 + ALERT - Duration::from_secs(1));
        assert_eq!(m.expire(t0 + ALERT), Some(IndicatorState::Idle));
        assert_eq!(m.next_deadline(), None);
    }

    #[test]
    fn test_newer_reminder_restarts_alert() {
        let t0 = Instant::now();
        let mut m = machine();

        m.reminder(t0);
        let second = t0 + Duration::from_secs(20);
        assert_eq!(m.reminder(second), None);
        assert_eq!(m.expire(t0 + ALERT), None);
        assert_eq!(m.expire(second + ALERT), Some(IndicatorState::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_scenario_activity_then_idle() {
        let (handle, _task) = IndicatorController::spawn_with(ACTIVE, ALERT);
        let mut events = handle.subscribe();
        let t0 = Instant::now();

        handle.report_activity().unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            IndicatorEvent::StateChanged(IndicatorState::Active)
        );
        assert_eq!(handle.current_state(), IndicatorState::Active);

        assert_eq!(
            events.recv().await.unwrap(),
            IndicatorEvent::StateChanged(IndicatorState::Idle)
        );
        assert_eq!(Instant::now() - t0, ACTIVE);
        assert_eq!(handle.current_state(), IndicatorState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_reminder_during_activity() {
        let (handle, _task) = IndicatorController::spawn_with(ACTIVE, ALERT);
        let mut events = handle.subscribe();

        handle.report_activity().unwrap();
        events.recv().await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        let reminded_at = Instant::now();
        let payload = reminder("e1");
        handle.report_reminder(payload.clone()).unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            IndicatorEvent::StateChanged(IndicatorState::Alert)
        );
        assert_eq!(events.recv().await.unwrap(), IndicatorEvent::Reminder(payload));

        // Activity while alerting changes nothing
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.report_activity().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.current_state(), IndicatorState::Alert);

        assert_eq!(
            events.recv().await.unwrap(),
            IndicatorEvent::StateChanged(IndicatorState::Idle)
        );
        assert_eq!(Instant::now() - reminded_at, ALERT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_shutdown_reports_timer_fault() {
        let (handle, task) = IndicatorController::spawn_with(ACTIVE, ALERT);
        handle.shutdown();
        task.await.unwrap();

        assert!(matches!(handle.report_activity(), Err(Error::TimerFault(_))));
    }
}
