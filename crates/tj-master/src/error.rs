//! Controller error types.

use thiserror::Error;

/// Failure to run the scheduling clock.
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("invalid clock interval: {0}ms")]
    InvalidInterval(f64),
    #[error("failed to spawn clock thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Error type for controller operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The runtime cannot produce audio; playback was not started
    #[error("audio renderer unavailable")]
    RendererUnavailable,
    #[error(transparent)]
    Clock(#[from] ClockError),
    #[error("invalid sequencer config: {0}")]
    Config(#[from] serde_json::Error),
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// An edit addressed a pattern, channel or step that does not exist
    #[error("invalid edit: {0}")]
    InvalidEdit(&'static str),
}
