//! PawTray Client
//!
//! Command-line client for the PawTray daemon. Prints the indicator as a text
//! glyph and follows state changes and calendar reminders.

mod daemon_proxy;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use daemon_proxy::{DaemonClient, DaemonEvent};
use pawtray_daemon::reminder_message;

#[derive(Debug, Parser)]
#[command(name = "pawtray", version, about = "Talk to the PawTray daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the current indicator state (default)
    Status,
    /// Make the dog run
    Activity,
    /// Check the nearest calendar event now
    Check,
    /// Print a line for every state change and reminder
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let client = DaemonClient::new().await?;

    match cli.command.unwrap_or(Command::Status) {
        Command::Status => {
            let state = client.current_state().await?;
            println!("{} {}", state.glyph(), state);
        }
        Command::Activity => client.report_activity().await?,
        Command::Check => client.check_calendar().await?,
        Command::Watch => {
            let state = client.current_state().await?;
            println!("{} {}", state.glyph(), state);

            client
                .watch(|event| println!("{}", render(&event)))
                .await?;
        }
    }

    Ok(())
}

fn render(event: &DaemonEvent) -> String {
    match event {
        DaemonEvent::StateChanged(state) => format!("{} {}", state.glyph(), state),
        DaemonEvent::Reminder { title, minutes_until } => {
            format!("⏰ {}", reminder_message(title, *minutes_until))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawtray_daemon::IndicatorState;

    #[test]
    fn test_render_events() {
        assert_eq!(
            render(&DaemonEvent::StateChanged(IndicatorState::Active)),
            "🏃🐕 active"
        );
        assert_eq!(
            render(&DaemonEvent::Reminder {
                title: "Standup".to_string(),
                minutes_until: 3,
            }),
            "⏰ Standup starts in 3 minutes"
        );
    }

    #[test]
    fn test_cli_defaults_to_status() {
        let cli = Cli::parse_from(["pawtray"]);
        assert!(cli.command.is_none());

        let cli = Cli::parse_from(["pawtray", "watch"]);
        assert!(matches!(cli.command, Some(Command::Watch)));
    }
}
