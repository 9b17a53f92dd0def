//! Shared server state injected into all Axum handlers.

use std::sync::Arc;

use crate::server::process::Shell;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Token every request must carry.
    token: Arc<str>,
    /// Shell used for `run`.
    pub shell: Arc<Shell>,
}

impl AppState {
    /// Creates the state for a server guarding commands with `token`.
    #[must_use]
    pub fn new(token: &str, shell: Shell) -> Self {
        Self {
            token: Arc::from(token),
            shell: Arc::new(shell),
        }
    }

    /// Returns `true` if `token` matches the server token.
    #[must_use]
    pub fn authorize(&self, token: &str) -> bool {
        !token.is_empty() && *self.token == *token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell() -> Shell {
        Shell {
            program: "sh".to_string(),
            flag: "-c".to_string(),
        }
    }

    #[test]
    fn authorize_requires_exact_token() {
        let state = AppState::new("s3cret", shell());
        assert!(state.authorize("s3cret"));
        assert!(!state.authorize("s3cre"));
        assert!(!state.authorize(""));
    }

    #[test]
    fn empty_server_token_accepts_nothing() {
        let state = AppState::new("", shell());
        assert!(!state.authorize(""));
    }
}
