//! PawTray Daemon
//!
//! Runs the indicator controller and the calendar reminder scheduler, and
//! exposes both over D-Bus for renderers.

use std::sync::Arc;
use anyhow::Context;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use zbus::connection::Connection;

use pawtray_daemon::activity::ActivitySimulator;
use pawtray_daemon::calendar::GoogleCalendar;
use pawtray_daemon::clock::SystemClock;
use pawtray_daemon::config::Config;
use pawtray_daemon::dbus_service;
use pawtray_daemon::indicator::{IndicatorController, IndicatorHandle};
use pawtray_daemon::notifications::NotificationService;
use pawtray_daemon::reminders::{ReminderScheduler, ReminderSettings, SchedulerHandle};
use pawtray_daemon::{Error, Reminder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting PawTray daemon");

    let config = Config::load()?;

    // The indicator owns the displayed state
    let (indicator, mut indicator_task) = IndicatorController::spawn(&config.indicator);

    let notifications = NotificationService::new(&config.notifications);
    notifications.spawn(indicator.subscribe());

    // Calendar reminders feed the indicator
    let mut scheduler = if config.calendar.enabled {
        let calendar = GoogleCalendar::new(&config.calendar)
            .context("Failed to set up the calendar source")?;
        let scheduler = ReminderScheduler::new(
            Arc::new(calendar),
            Arc::new(SystemClock),
            ReminderSettings::from(&config.reminders),
        );
        forward_reminders(scheduler.subscribe(), indicator.clone());
        Some(scheduler.start())
    } else {
        tracing::info!("Calendar reminders disabled");
        None
    };
    let scheduler_handle = scheduler.as_ref().map(|(handle, _)| handle.clone());

    // Connect to the session bus
    let connection = Connection::session().await?;
    tracing::info!("Connected to session D-Bus");

    dbus_service::start_service(&connection, indicator.clone(), scheduler_handle.clone()).await?;

    let cancel = CancellationToken::new();
    if config.activity.keyboard {
        #[cfg(feature = "keyboard")]
        pawtray_daemon::activity::keyboard::spawn(indicator.clone());
        #[cfg(not(feature = "keyboard"))]
        tracing::warn!("activity.keyboard is set but this build has no keyboard support");
    }
    if config.activity.simulate {
        let simulator = ActivitySimulator::from(&config.activity);
        tokio::spawn(simulator.run(indicator.clone(), cancel.clone()));
    }

    tracing::info!("PawTray daemon is running");

    // Keep running until interrupted or a timer task dies
    let outcome = tokio::select! {
        result = tokio::signal::ctrl_c() => result.map_err(anyhow::Error::from),
        result = &mut indicator_task => Err(task_fault("indicator controller", result).into()),
        result = scheduler_task(&mut scheduler) => Err(task_fault("reminder scheduler", result).into()),
    };

    tracing::info!("Shutting down PawTray daemon");
    cancel.cancel();
    if let Some(handle) = scheduler_handle {
        handle.stop();
    }
    indicator.shutdown();

    outcome
}

/// Hand every reminder to the indicator
fn forward_reminders(mut reminders: broadcast::Receiver<Reminder>, indicator: IndicatorHandle) {
    tokio::spawn(async move {
        loop {
            match reminders.recv().await {
                Ok(reminder) => {
                    if let Err(e) = indicator.report_reminder(reminder) {
                        tracing::error!("Dropping reminder: {}", e);
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Missed {} reminders", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Resolves when the scheduler task ends; never if there is no scheduler
async fn scheduler_task(
    scheduler: &mut Option<(SchedulerHandle, JoinHandle<()>)>,
) -> Result<(), tokio::task::JoinError> {
    match scheduler {
        Some((_, task)) => task.await,
        None => std::future::pending().await,
    }
}

fn task_fault(name: &str, result: Result<(), tokio::task::JoinError>) -> Error {
    match result {
        Ok(()) => Error::TimerFault(format!("{} exited unexpectedly", name)),
        Err(e) => Error::TimerFault(format!("{} failed: {}", name, e)),
    }
}
