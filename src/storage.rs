//! Persisted console preferences.
//!
//! The console remembers the last-used port, token, command line and
//! recording document. They are read once at startup to prepopulate the
//! session parameters and written back on every change.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;

/// Everything the console persists between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Last server port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Last authentication token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Last command line passed to `run`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
    /// Last recording document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_recording: Option<Value>,
    /// When the preferences were last written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Key-value store for [`Preferences`].
pub trait PreferenceStore: Send {
    /// Reads the stored preferences, or defaults if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Storage`] if stored data exists but cannot be
    /// read.
    fn load(&self) -> Result<Preferences, RelayError>;

    /// Replaces the stored preferences.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Storage`] if the write fails.
    fn save(&mut self, prefs: &Preferences) -> Result<(), RelayError>;
}

/// Preferences kept as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Creates a store backed by `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonFileStore {
    fn load(&self) -> Result<Preferences, RelayError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Preferences::default());
            }
            Err(e) => {
                return Err(RelayError::Storage(format!(
                    "{}: {e}",
                    self.path.display()
                )));
            }
        };
        serde_json::from_str(&text)
            .map_err(|e| RelayError::Storage(format!("{}: {e}", self.path.display())))
    }

    fn save(&mut self, prefs: &Preferences) -> Result<(), RelayError> {
        let text = serde_json::to_string_pretty(prefs)?;
        std::fs::write(&self.path, text)
            .map_err(|e| RelayError::Storage(format!("{}: {e}", self.path.display())))?;
        tracing::debug!(path = %self.path.display(), "preferences saved");
        Ok(())
    }
}

/// In-memory store, for tests and for running without a writable disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    prefs: Option<Preferences>,
    saves: usize,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `prefs`.
    #[must_use]
    pub fn with(prefs: Preferences) -> Self {
        Self {
            prefs: Some(prefs),
            saves: 0,
        }
    }

    /// Number of completed saves.
    #[must_use]
    pub const fn saves(&self) -> usize {
        self.saves
    }

    /// Last saved value.
    #[must_use]
    pub const fn stored(&self) -> Option<&Preferences> {
        self.prefs.as_ref()
    }
}

impl PreferenceStore for MemoryStore {
    fn load(&self) -> Result<Preferences, RelayError> {
        Ok(self.prefs.clone().unwrap_or_default())
    }

    fn save(&mut self, prefs: &Preferences) -> Result<(), RelayError> {
        self.prefs = Some(prefs.clone());
        self.saves += 1;
        Ok(())
    }
}
