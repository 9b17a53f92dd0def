//! Connection/run lifecycle state machine.
//!
//! ```text
//!                 connect             first status
//!  Disconnected ──────────▶ Connecting ────────────▶ Connected ◀──┐
//!       ▲                                              │  run     │ completion
//!       │          close / error / auth failure        ▼          │
//!       └──────────────────── (any) ◀──────────────── Running ────┘
//! ```
//!
//! [`StatusMachine`] is the only place a [`Status`] changes. Anything that
//! is not one of the edges above is refused and the state stays put.

use std::fmt;

use crate::error::RelayError;

/// Lifecycle state of a console session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Status {
    /// No socket. Initial and terminal state.
    #[default]
    Disconnected,
    /// Socket requested, waiting for the first status response.
    Connecting,
    /// Server reachable and idle.
    Connected,
    /// A command is executing on the server.
    Running,
}

impl Status {
    /// Returns `true` if `self → to` is a listed edge.
    ///
    /// Self-transitions are not edges; callers treat them as no-ops.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Connected)
                | (Self::Connected, Self::Running)
                | (Self::Running, Self::Connected)
                | (_, Self::Disconnected)
        )
    }

    /// Returns `true` while the liveness probe must be running.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Connected | Self::Running)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Running => "running",
        };
        f.write_str(name)
    }
}

/// Authoritative holder of the current [`Status`].
#[derive(Debug, Default)]
pub struct StatusMachine {
    current: Status,
}

impl StatusMachine {
    /// Creates a machine in [`Status::Disconnected`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[must_use]
    pub const fn current(&self) -> Status {
        self.current
    }

    /// Attempts to move to `to`.
    ///
    /// Returns `Ok(true)` if the state changed and `Ok(false)` for a
    /// self-transition.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::IllegalTransition`] if `to` is not reachable
    /// from the current state. The refusal is logged and the state is left
    /// unchanged.
    pub fn transition(&mut self, to: Status) -> Result<bool, RelayError> {
        let from = self.current;
        if from == to {
            return Ok(false);
        }
        if !from.can_transition_to(to) {
            tracing::error!(%from, %to, "illegal status transition refused");
            return Err(RelayError::IllegalTransition { from, to });
        }
        tracing::debug!(%from, %to, "status transition");
        self.current = to;
        Ok(true)
    }

    /// Moves to [`Status::Disconnected`] from any state.
    ///
    /// Returns `true` if the state changed.
    pub fn force_disconnected(&mut self) -> bool {
        let changed = self.current != Status::Disconnected;
        if changed {
            tracing::debug!(from = %self.current, "forced disconnect");
        }
        self.current = Status::Disconnected;
        changed
    }
}
