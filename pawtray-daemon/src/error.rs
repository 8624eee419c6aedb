//! Error types shared by the daemon components

use thiserror::Error;

/// Failures reported by a calendar source
#[derive(Debug, Error)]
pub enum CalendarError {
    /// The source could not be reached or refused our credentials
    #[error("calendar source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single event had no usable identifier or start time
    #[error("malformed event {id}: {reason}")]
    MalformedEvent { id: String, reason: String },

    /// The response as a whole could not be decoded
    #[error("malformed calendar response: {0}")]
    Malformed(String),
}

/// Daemon level errors
#[derive(Debug, Error)]
pub enum Error {
    /// A timer-driven task is gone; the daemon cannot make progress
    #[error("timer fault: {0}")]
    TimerFault(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
