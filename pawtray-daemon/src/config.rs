use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

/// Longest timer period accepted anywhere in the config (30 days)
pub const MAX_PERIOD_SECS: u64 = 30 * 24 * 60 * 60;

/// Longest calendar lookahead accepted (one year)
pub const MAX_LOOKAHEAD_HOURS: u64 = 366 * 24;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub indicator: IndicatorConfig,
    pub reminders: RemindersConfig,
    pub calendar: CalendarConfig,
    pub activity: ActivityConfig,
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// How long the indicator stays active after the last activity, in milliseconds
    pub active_ms: u64,
    /// How long a reminder keeps the indicator in the alert state, in seconds
    pub alert_secs: u64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            active_ms: 3000,
            alert_secs: 30,
        }
    }
}

impl IndicatorConfig {
    pub fn active_duration(&self) -> Duration {
        Duration::from_millis(self.active_ms)
    }

    pub fn alert_duration(&self) -> Duration {
        Duration::from_secs(self.alert_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemindersConfig {
    /// Calendar poll interval in seconds
    pub poll_interval_secs: u64,
    /// How far ahead to ask the calendar for events, in hours
    pub lookahead_hours: u64,
    /// Remind when an event starts within this many minutes
    pub threshold_minutes: u32,
    /// How long a reminded event stays suppressed, in minutes
    pub retention_minutes: u64,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300, // 5 minutes
            lookahead_hours: 24,
            threshold_minutes: 15,
            retention_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub enabled: bool,
    /// Google Calendar identifier ("primary" for the account's main calendar)
    pub calendar_id: String,
    /// File holding the OAuth access token (JSON with an `access_token` field)
    /// Default: ~/.config/pawtray/token.json
    pub token_path: Option<PathBuf>,
    /// Maximum number of events requested per poll
    pub max_results: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            calendar_id: "primary".to_string(),
            token_path: None,
            max_results: 10,
            timeout_secs: 30,
        }
    }
}

impl CalendarConfig {
    pub fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| Config::config_dir().join("token.json"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Listen for global key presses (requires the `keyboard` feature)
    pub keyboard: bool,
    /// Generate random activity when no real activity source is wired up
    pub simulate: bool,
    /// How often to roll for simulated activity, in milliseconds
    pub simulate_interval_ms: u64,
    /// Chance of simulated activity per roll (0.0 - 1.0)
    pub simulate_probability: f64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            keyboard: false,
            simulate: false,
            simulate_interval_ms: 2000,
            simulate_probability: 0.15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub enabled: bool,
    /// Notification timeout in milliseconds (0 = no timeout)
    pub timeout_ms: u32,
    /// Freedesktop sound theme name played with reminders (empty = silent)
    pub sound_name: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 10000,
            sound_name: "message-new-instant".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default path (~/.config/pawtray/config.toml)
    /// Creates the config file with defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    /// Creates the config file with defaults if it doesn't exist
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("Config file not found at {:?}, creating with defaults", path);
            Self::write_default_config(path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;

        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Check that every duration is usable and the reminder window makes sense
    pub fn validate(&self) -> crate::error::Result<()> {
        let invalid = |msg: &str| Err(Error::Config(msg.to_string()));
        let too_long = |secs: u64| secs > MAX_PERIOD_SECS;

        if self.indicator.active_ms == 0 {
            return invalid("indicator.active_ms must be greater than zero");
        }
        if self.indicator.alert_secs == 0 {
            return invalid("indicator.alert_secs must be greater than zero");
        }
        if self.reminders.poll_interval_secs == 0 {
            return invalid("reminders.poll_interval_secs must be greater than zero");
        }
        if self.reminders.retention_minutes == 0 {
            return invalid("reminders.retention_minutes must be greater than zero");
        }
        if self.reminders.threshold_minutes == 0 {
            return invalid("reminders.threshold_minutes must be greater than zero");
        }

        if too_long(self.indicator.active_ms / 1000) {
            return invalid("indicator.active_ms must be at most 30 days");
        }
        if too_long(self.indicator.alert_secs) {
            return invalid("indicator.alert_secs must be at most 30 days");
        }
        if too_long(self.reminders.poll_interval_secs) {
            return invalid("reminders.poll_interval_secs must be at most 30 days");
        }
        if self.reminders.retention_minutes.checked_mul(60).map_or(true, too_long) {
            return invalid("reminders.retention_minutes must be at most 30 days");
        }
        if too_long(self.activity.simulate_interval_ms / 1000) {
            return invalid("activity.simulate_interval_ms must be at most 30 days");
        }
        if self.reminders.lookahead_hours > MAX_LOOKAHEAD_HOURS {
            return invalid("reminders.lookahead_hours must be at most one year");
        }
        if u64::from(self.reminders.threshold_minutes) > self.reminders.lookahead_hours * 60 {
            return invalid("reminders.threshold_minutes must fit inside reminders.lookahead_hours");
        }
        if self.calendar.max_results == 0 {
            return invalid("calendar.max_results must be greater than zero");
        }
        if self.activity.simulate_interval_ms == 0 {
            return invalid("activity.simulate_interval_ms must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.activity.simulate_probability) {
            return invalid("activity.simulate_probability must be between 0.0 and 1.0");
        }

        Ok(())
    }

    /// Write the default configuration to a file
    fn write_default_config(path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        fs::write(path, Self::default_config_string())
            .with_context(|| format!("Failed to write default config to {:?}", path))?;

        tracing::info!("Created default config at {:?}", path);
        Ok(())
    }

    /// Generate the default configuration as a TOML string
    fn default_config_string() -> String {
        r#"# PawTray Configuration

[indicator]
active_ms = 3000        # Stay active this long after the last activity
alert_secs = 30         # Stay in alert this long after a reminder

[reminders]
poll_interval_secs = 300
lookahead_hours = 24
threshold_minutes = 15  # Remind when an event starts within this many minutes
retention_minutes = 60  # Don't remind about the same event again for this long

# Uncomment to enable Google Calendar reminders.
# The token file must contain {"access_token": "..."}
# [calendar]
# enabled = true
# calendar_id = "primary"
# token_path = "/home/me/.config/pawtray/token.json"
# max_results = 10
# timeout_secs = 30

[activity]
keyboard = false        # Global key listener, needs the "keyboard" build feature
simulate = false        # Random activity for demos, no input hook needed
simulate_interval_ms = 2000
simulate_probability = 0.15

[notifications]
enabled = true
timeout_ms = 10000
sound_name = "message-new-instant"  # Empty for silent reminders
"#
        .to_string()
    }

    /// Get the configuration directory (~/.config/pawtray)
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pawtray")
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
