//! Configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). The server and the console read
//! separate sets of keys but share the `RELAY_TOKEN` secret.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::RelayError;

/// Environment key holding the shared session token.
pub const TOKEN_ENV: &str = "RELAY_TOKEN";

/// Command server configuration.
///
/// Loaded once at startup via [`ServerConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind to (e.g. `127.0.0.1:4000`).
    pub listen_addr: SocketAddr,

    /// Token every request must carry. `None` means one is generated at
    /// startup.
    pub token: Option<String>,

    /// Shell program used to interpret command lines.
    pub shell: String,

    /// Flag passing the command line to [`Self::shell`].
    pub shell_flag: String,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// | Key              | Default                         |
    /// |------------------|---------------------------------|
    /// | `LISTEN_ADDR`    | `127.0.0.1:4000`                |
    /// | `RELAY_TOKEN`    | generated                       |
    /// | `RELAY_SHELL`    | `sh` (`cmd` on Windows)         |
    /// | `RELAY_SHELL_FLAG` | `-c` (`/C` on Windows)        |
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if `LISTEN_ADDR` is set but cannot be
    /// parsed as a [`SocketAddr`].
    pub fn from_env() -> Result<Self, RelayError> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:4000".to_string())
            .parse()
            .map_err(|e| RelayError::Config(format!("LISTEN_ADDR: {e}")))?;

        let token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty());

        let (default_shell, default_flag) = if cfg!(windows) {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        let shell = std::env::var("RELAY_SHELL").unwrap_or_else(|_| default_shell.to_string());
        let shell_flag =
            std::env::var("RELAY_SHELL_FLAG").unwrap_or_else(|_| default_flag.to_string());

        Ok(Self {
            listen_addr,
            token,
            shell,
            shell_flag,
        })
    }
}

/// Console configuration. Stored preferences take precedence over the
/// port and token given here.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Server host.
    pub host: String,

    /// Default server port.
    pub port: u16,

    /// Default token.
    pub token: Option<String>,

    /// Liveness probe period.
    pub probe_interval: Duration,

    /// Preference file location.
    pub prefs_path: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4000,
            token: None,
            probe_interval: Duration::from_millis(1000),
            prefs_path: ".relay-console.json".to_string(),
        }
    }
}

impl ConsoleConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to [`ConsoleConfig::default`] for anything unset or
    /// unparseable. A zero probe interval is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if `RELAY_PROBE_INTERVAL_MS` is `0`.
    pub fn from_env() -> Result<Self, RelayError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let probe_ms = parse_env("RELAY_PROBE_INTERVAL_MS", 1000_u64);
        if probe_ms == 0 {
            return Err(RelayError::Config(
                "RELAY_PROBE_INTERVAL_MS must be positive".to_string(),
            ));
        }

        Ok(Self {
            host: std::env::var("RELAY_HOST").unwrap_or(defaults.host),
            port: parse_env("RELAY_PORT", defaults.port),
            token: std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()),
            probe_interval: Duration::from_millis(probe_ms),
            prefs_path: std::env::var("RELAY_PREFS_PATH").unwrap_or(defaults.prefs_path),
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_defaults() {
        let config = ConsoleConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 4000);
        assert_eq!(config.probe_interval, Duration::from_secs(1));
    }

    #[test]
    fn parse_env_falls_back_on_missing_key() {
        let value = parse_env("RELAY_TEST_SURELY_UNSET_KEY", 17_u16);
        assert_eq!(value, 17);
    }
}
