//! Activity sources
//!
//! The simulator stands in for a real input hook: every interval it rolls the
//! dice and, if the indicator is idle, reports an activity edge. With the
//! `keyboard` feature a global key listener is available as well. Anything
//! else can report edges over D-Bus with `ReportActivity`.

use std::time::Duration;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::ActivityConfig;
use crate::indicator::IndicatorHandle;
use crate::IndicatorState;

pub struct ActivitySimulator {
    interval: Duration,
    probability: f64,
}

impl ActivitySimulator {
    pub fn new(interval: Duration, probability: f64) -> Self {
        Self {
            interval,
            probability: probability.clamp(0.0, 1.0),
        }
    }

    /// Whether a roll in `[0, 1)` produces activity in the given state
    pub fn should_fire(&self, state: IndicatorState, roll: f64) -> bool {
        state == IndicatorState::Idle && roll < self.probability
    }

    /// Run until cancelled or the indicator goes away
    pub async fn run(self, indicator: IndicatorHandle, cancel: CancellationToken) {
        tracing::info!(
            "Simulating activity every {:?} (p = {})",
            self.interval,
            self.probability
        );

        let mut ticker = tokio::time::interval(self.interval);
        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let roll: f64 = rand::thread_rng().gen();
                    if !self.should_fire(indicator.current_state(), roll) {
                        continue;
                    }

                    tracing::debug!("Simulated activity");
                    if let Err(e) = indicator.report_activity() {
                        tracing::warn!("Stopping activity simulation: {}", e);
                        break;
                    }
                }
            }
        }
    }
}

impl From<&ActivityConfig> for ActivitySimulator {
    fn from(config: &ActivityConfig) -> Self {
        Self::new(
            Duration::from_millis(config.simulate_interval_ms),
            config.simulate_probability,
        )
    }
}

/// Global key listener
#[cfg(feature = "keyboard")]
pub mod keyboard {
    use rdev::{EventType, Key};

    use crate::indicator::IndicatorHandle;

    /// Modifiers, Tab and Escape on their own are not activity
    pub fn counts_as_activity(key: Key) -> bool {
        !matches!(
            key,
            Key::ControlLeft
                | Key::ControlRight
                | Key::ShiftLeft
                | Key::ShiftRight
                | Key::Alt
                | Key::AltGr
                | Key::MetaLeft
                | Key::MetaRight
                | Key::CapsLock
                | Key::Tab
                | Key::Escape
        )
    }

    /// Listen for key presses on a dedicated thread. Only the fact that a key
    /// was pressed is forwarded.
    pub fn spawn(indicator: IndicatorHandle) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            tracing::info!("Listening for keyboard activity");

            let result = rdev::listen(move |event| {
                if let EventType::KeyPress(key) = event.event_type {
                    if counts_as_activity(key) {
                        if let Err(e) = indicator.report_activity() {
                            tracing::debug!("Dropping keyboard activity: {}", e);
                        }
                    }
                }
            });

            if let Err(e) = result {
                tracing::warn!("Keyboard listener failed: {:?}", e);
            }
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::IndicatorController;

    #[test]
    fn test_should_fire_only_when_idle() {
        let simulator = ActivitySimulator::new(Duration::from_secs(2), 0.15);
        assert!(simulator.should_fire(IndicatorState::Idle, 0.1));
        assert!(!simulator.should_fire(IndicatorState::Idle, 0.15));
        assert!(!simulator.should_fire(IndicatorState::Active, 0.0));
        assert!(!simulator.should_fire(IndicatorState::Alert, 0.0));
    }

    #[test]
    fn test_probability_is_clamped() {
        let simulator = ActivitySimulator::new(Duration::from_secs(2), 4.0);
        assert!(simulator.should_fire(IndicatorState::Idle, 0.999));
    }

    #[tokio::test(start_paused = true)]
    async fn test_certain_simulation_drives_indicator() {
        let (indicator, _task) =
            IndicatorController::spawn_with(Duration::from_secs(3), Duration::from_secs(30));
        let mut events = indicator.subscribe();
        let cancel = CancellationToken::new();

        let simulator = ActivitySimulator::new(Duration::from_secs(2), 1.0);
        let run = tokio::spawn(simulator.run(indicator.clone(), cancel.clone()));

        assert_eq!(
            events.recv().await.unwrap(),
            crate::IndicatorEvent::StateChanged(IndicatorState::Active)
        );

        cancel.cancel();
        run.await.unwrap();
    }
}
