//! D-Bus service for client communication
//!
//! This module implements the org.pawtray.Daemon interface that renderers use
//! to read the indicator state, report activity and follow reminders.

use tokio::sync::broadcast;
use zbus::interface;
use zbus::names::WellKnownName;
use zbus::object_server::SignalEmitter;

use crate::indicator::IndicatorHandle;
use crate::reminders::SchedulerHandle;
use crate::IndicatorEvent;

/// The main daemon D-Bus service
pub struct DaemonService {
    indicator: IndicatorHandle,
    scheduler: Option<SchedulerHandle>,
}

impl DaemonService {
    pub fn new(indicator: IndicatorHandle, scheduler: Option<SchedulerHandle>) -> Self {
        Self { indicator, scheduler }
    }
}

#[interface(name = "org.pawtray.Daemon")]
impl DaemonService {
    /// Current indicator state ("idle", "active" or "alert")
    async fn current_state(&self) -> String {
        self.indicator.current_state().as_str().to_string()
    }

    /// Text glyph for the current state
    async fn glyph(&self) -> String {
        self.indicator.current_state().glyph().to_string()
    }

    /// Report one activity edge (e.g. from a "make the dog run" menu item)
    async fn report_activity(&self) -> zbus::fdo::Result<()> {
        tracing::debug!("ReportActivity called");
        self.indicator
            .report_activity()
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Check the nearest calendar event right away
    async fn check_calendar(&self) -> zbus::fdo::Result<()> {
        let scheduler = self.scheduler.as_ref().ok_or_else(|| {
            zbus::fdo::Error::NotSupported("Calendar reminders are disabled".to_string())
        })?;
        scheduler
            .check_next()
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Signal emitted on every indicator state transition
    #[zbus(signal)]
    pub async fn state_changed(emitter: &SignalEmitter<'_>, state: &str) -> zbus::Result<()>;

    /// Signal emitted once per calendar reminder
    #[zbus(signal)]
    pub async fn reminder(
        emitter: &SignalEmitter<'_>,
        event_id: &str,
        title: &str,
        minutes_until: u32,
    ) -> zbus::Result<()>;
}

/// Start the daemon D-Bus service
pub async fn start_service(
    connection: &zbus::Connection,
    indicator: IndicatorHandle,
    scheduler: Option<SchedulerHandle>,
) -> anyhow::Result<()> {
    let mut rx = indicator.subscribe();
    let service = DaemonService::new(indicator, scheduler);

    // Register the interface
    connection
        .object_server()
        .at(crate::dbus::DAEMON_OBJECT_PATH, service)
        .await?;

    // Request the well-known name
    let bus_name: WellKnownName = crate::dbus::DAEMON_BUS_NAME.try_into()?;
    connection.request_name(bus_name).await?;

    tracing::info!(
        "Started D-Bus service: {} at {}",
        crate::dbus::DAEMON_BUS_NAME,
        crate::dbus::DAEMON_OBJECT_PATH
    );

    // Forward indicator events as signals
    let connection_clone = connection.clone();

    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("D-Bus service missed {} indicator events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let iface_ref = match connection_clone
                .object_server()
                .interface::<_, DaemonService>(crate::dbus::DAEMON_OBJECT_PATH)
                .await
            {
                Ok(iface_ref) => iface_ref,
                Err(e) => {
                    tracing::warn!("D-Bus interface unavailable: {}", e);
                    continue;
                }
            };
            let emitter = iface_ref.signal_emitter();

            let result = match event {
                IndicatorEvent::StateChanged(state) => {
                    DaemonService::state_changed(emitter, state.as_str()).await
                }
                IndicatorEvent::Reminder(reminder) => {
                    DaemonService::reminder(
                        emitter,
                        &reminder.event.id,
                        &reminder.event.title,
                        reminder.minutes_until,
                    )
                    .await
                }
            };

            if let Err(e) = result {
                tracing::warn!("Failed to emit indicator signal: {}", e);
            }
        }
    });

    Ok(())
}
