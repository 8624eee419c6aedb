//! D-Bus proxy for communicating with the daemon

use futures::StreamExt;
use pawtray_daemon::IndicatorState;
use zbus::proxy;
use zbus::Connection;

/// Proxy for the PawTray daemon D-Bus interface
#[proxy(
    interface = "org.pawtray.Daemon",
    default_service = "org.pawtray.Daemon",
    default_path = "/org/pawtray/Daemon"
)]
trait PawTrayDaemon {
    /// Current indicator state
    fn current_state(&self) -> zbus::Result<String>;

    /// Text glyph for the current state
    fn glyph(&self) -> zbus::Result<String>;

    /// Report one activity edge
    fn report_activity(&self) -> zbus::Result<()>;

    /// Check the nearest calendar event right away
    fn check_calendar(&self) -> zbus::Result<()>;

    /// Signal emitted on every state transition
    #[zbus(signal)]
    fn state_changed(&self, state: String) -> zbus::Result<()>;

    /// Signal emitted once per calendar reminder
    #[zbus(signal)]
    fn reminder(&self, event_id: String, title: String, minutes_until: u32) -> zbus::Result<()>;
}

/// Something the daemon announced
#[derive(Debug, Clone)]
pub enum DaemonEvent {
    StateChanged(IndicatorState),
    Reminder { title: String, minutes_until: u32 },
}

/// Client for communicating with the PawTray daemon
pub struct DaemonClient {
    proxy: PawTrayDaemonProxy<'static>,
}

impl DaemonClient {
    /// Create a new daemon client
    pub async fn new() -> anyhow::Result<Self> {
        let connection = Connection::session().await?;
        let proxy = PawTrayDaemonProxy::new(&connection).await?;
        Ok(Self { proxy })
    }

    pub async fn current_state(&self) -> anyhow::Result<IndicatorState> {
        let state = self.proxy.current_state().await?;
        IndicatorState::parse(&state)
            .ok_or_else(|| anyhow::anyhow!("Daemon reported unknown state: {}", state))
    }

    pub async fn report_activity(&self) -> anyhow::Result<()> {
        self.proxy.report_activity().await?;
        Ok(())
    }

    pub async fn check_calendar(&self) -> anyhow::Result<()> {
        self.proxy.check_calendar().await?;
        Ok(())
    }

    /// Call `on_event` for every state change and reminder until the
    /// daemon goes away
    pub async fn watch<F>(&self, mut on_event: F) -> anyhow::Result<()>
    where
        F: FnMut(DaemonEvent),
    {
        let mut states = self.proxy.receive_state_changed().await?;
        let mut reminders = self.proxy.receive_reminder().await?;

        loop {
            tokio::select! {
                signal = states.next() => {
                    let Some(signal) = signal else { break };
                    let args = signal.args()?;
                    match IndicatorState::parse(&args.state) {
                        Some(state) => on_event(DaemonEvent::StateChanged(state)),
                        None => tracing::warn!("Ignoring unknown state: {}", args.state),
                    }
                }
                signal = reminders.next() => {
                    let Some(signal) = signal else { break };
                    let args = signal.args()?;
                    on_event(DaemonEvent::Reminder {
                        title: args.title.clone(),
                        minutes_until: args.minutes_until,
                    });
                }
            }
        }

        Ok(())
    }
}
