//! Inbound response frames: `{"success", "type", "payload", "error"}`.
//!
//! The raw [`Response`] is what travels on the wire. Consumers on the
//! console side never switch on the `type` string directly; they call
//! [`Response::into_inbound`] and match on [`Inbound`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AUTHENTICATION_ERROR, RelayError};

/// `type` value of status responses.
pub const STATUS_TYPE: &str = "status";
/// `type` value of output responses.
pub const OUTPUT_TYPE: &str = "output";

/// Error string for frames that are not valid requests.
pub const INVALID_REQUEST: &str = "InvalidRequest";
/// Error string for `run` while a command is running.
pub const ALREADY_RUNNING: &str = "AlreadyRunning";
/// Error string for `stop`/`readline` with nothing running.
pub const NOT_RUNNING: &str = "NotRunning";
/// Error string for a command that could not be started.
pub const SPAWN_ERROR: &str = "SpawnError";

/// Run state reported by the server in a `status` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    /// Server is idle.
    Connected,
    /// A child process is running.
    Running,
}

/// Which child stream an output fragment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// One incremental fragment of child output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    /// Source stream.
    pub stream: OutputStream,
    /// Raw text, not necessarily line-aligned.
    pub data: String,
}

impl OutputChunk {
    /// Creates a stdout fragment.
    #[must_use]
    pub fn stdout(data: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stdout,
            data: data.into(),
        }
    }

    /// Creates a stderr fragment.
    #[must_use]
    pub fn stderr(data: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stderr,
            data: data.into(),
        }
    }
}

/// Failure classification of a `success: false` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Token was rejected; the session must end.
    Authentication,
    /// Any other server-side error string.
    Other(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => f.write_str(AUTHENTICATION_ERROR),
            Self::Other(msg) => f.write_str(msg),
        }
    }
}

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `success: false`.
    Failure {
        /// `type` of the failed response (usually the command name).
        kind: String,
        /// Error classification.
        error: FailureKind,
    },
    /// `type: "status"`.
    Status(RemoteStatus),
    /// `type: "output"`.
    Output(OutputChunk),
    /// Any other `type`; ignored by the router.
    Unknown(String),
}

/// Raw wire response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Whether the request succeeded.
    pub success: bool,
    /// Response kind discriminator.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Kind-specific payload.
    #[serde(default)]
    pub payload: Value,
    /// Error string when `success` is false.
    #[serde(default)]
    pub error: Option<String>,
}

impl Response {
    /// Builds a successful status response.
    #[must_use]
    pub fn status(status: RemoteStatus) -> Self {
        Self {
            success: true,
            kind: STATUS_TYPE.to_string(),
            payload: serde_json::to_value(status).unwrap_or_default(),
            error: None,
        }
    }

    /// Builds a successful output response.
    #[must_use]
    pub fn output(chunk: &OutputChunk) -> Self {
        Self {
            success: true,
            kind: OUTPUT_TYPE.to_string(),
            payload: serde_json::to_value(chunk).unwrap_or_default(),
            error: None,
        }
    }

    /// Builds a failure response of the given kind.
    #[must_use]
    pub fn failure(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            kind: kind.into(),
            payload: Value::Null,
            error: Some(error.into()),
        }
    }

    /// Encodes the response as a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Json`] on encoding failure.
    pub fn to_frame(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Protocol`] for anything that is not a response
    /// object.
    pub fn from_frame(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|e| RelayError::Protocol(e.to_string()))
    }

    /// Converts the wire response into the tagged [`Inbound`] variant.
    ///
    /// A bare string output payload is treated as stdout.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Protocol`] when a `status` or `output` payload
    /// has the wrong shape.
    pub fn into_inbound(self) -> Result<Inbound, RelayError> {
        if !self.success {
            let error = match self.error {
                Some(e) if e == AUTHENTICATION_ERROR => FailureKind::Authentication,
                Some(e) => FailureKind::Other(e),
                None => FailureKind::Other("unknown error".to_string()),
            };
            return Ok(Inbound::Failure {
                kind: self.kind,
                error,
            });
        }

        match self.kind.as_str() {
            STATUS_TYPE => serde_json::from_value(self.payload)
                .map(Inbound::Status)
                .map_err(|e| RelayError::Protocol(format!("status payload: {e}"))),
            OUTPUT_TYPE => match self.payload {
                Value::String(data) => Ok(Inbound::Output(OutputChunk::stdout(data))),
                other => serde_json::from_value(other)
                    .map(Inbound::Output)
                    .map_err(|e| RelayError::Protocol(format!("output payload: {e}"))),
            },
            _ => Ok(Inbound::Unknown(self.kind)),
        }
    }
}
