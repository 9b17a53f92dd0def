//! Relay error types.
//!
//! [`RelayError`] is the central error type shared by the console client and
//! the command server. Every variant is recoverable: the client handles them
//! by forcing the session back to [`Status::Disconnected`] or reporting a
//! diagnostic, never by aborting the process.
//!
//! [`Status::Disconnected`]: crate::client::Status::Disconnected

use crate::client::Status;

/// Error string the server sends when a request token does not match.
pub const AUTHENTICATION_ERROR: &str = "AuthenticationError";

/// Error enum for every fallible relay operation.
///
/// # Taxonomy
///
/// | Category          | Variants                                   |
/// |-------------------|--------------------------------------------|
/// | Connection        | `NotConnected`, `Socket`                   |
/// | Protocol          | `Protocol`, `Json`                         |
/// | State machine     | `IllegalTransition`, `RunInProgress`       |
/// | Local environment | `Storage`, `Io`, `Config`, `InvalidInput`  |
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A command was dispatched while no socket was open.
    #[error("not connected to a command server")]
    NotConnected,

    /// A `run` was requested while a previous run is still in progress.
    #[error("a command is already running")]
    RunInProgress,

    /// The status state machine refused an edge.
    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition {
        /// State before the attempted transition.
        from: Status,
        /// Requested target state.
        to: Status,
    },

    /// A frame did not match the wire format.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Socket-level failure (open, send, or close).
    #[error("socket error: {0}")]
    Socket(String),

    /// Preference store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Console input that could not be understood.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Returns `true` for errors that mean the channel itself is unusable.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Socket(_))
    }
}
