//! Outbound request frames: `{"token", "command", "args"}`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;

/// Discriminator for the `command` field of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandName {
    /// Query the server's run status.
    Status,
    /// Start a command line.
    Run,
    /// Kill the running command.
    Stop,
    /// Write one line to the running command's stdin.
    Readline,
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Status => "status",
            Self::Run => "run",
            Self::Stop => "stop",
            Self::Readline => "readline",
        };
        f.write_str(name)
    }
}

/// Arguments of a `run` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArgs {
    /// Shell command line to execute.
    pub command_line: String,
    /// Optional recording document handed to the child process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording: Option<Value>,
}

/// Arguments of a `readline` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadlineArgs {
    /// Input line, without the trailing newline.
    pub line: String,
}

/// A typed command, decoded from or encoded into a [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Status query.
    Status,
    /// Run a command line.
    Run(RunArgs),
    /// Stop the running command.
    Stop,
    /// Send one input line.
    Readline(ReadlineArgs),
}

impl Command {
    /// Returns the wire name of this command.
    #[must_use]
    pub const fn name(&self) -> CommandName {
        match self {
            Self::Status => CommandName::Status,
            Self::Run(_) => CommandName::Run,
            Self::Stop => CommandName::Stop,
            Self::Readline(_) => CommandName::Readline,
        }
    }

    fn args(&self) -> Result<Option<Value>, RelayError> {
        Ok(match self {
            Self::Status | Self::Stop => None,
            Self::Run(args) => Some(serde_json::to_value(args)?),
            Self::Readline(args) => Some(serde_json::to_value(args)?),
        })
    }
}

/// One outbound frame. Immutable once built; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Shared session token.
    pub token: String,
    /// Command discriminator.
    pub command: CommandName,
    /// Command-specific arguments, omitted for `status` and `stop`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

impl Request {
    /// Builds a request for `command` tagged with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Json`] if the arguments cannot be encoded.
    pub fn new(token: impl Into<String>, command: &Command) -> Result<Self, RelayError> {
        Ok(Self {
            token: token.into(),
            command: command.name(),
            args: command.args()?,
        })
    }

    /// Encodes the request as a text frame.
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
    /// Returns [`RelayError::Protocol`] if the frame is not a request.
    pub fn from_frame(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|e| RelayError::Protocol(e.to_string()))
    }

    /// Decodes the arguments into a typed [`Command`].
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Protocol`] if `run` or `readline` arrive with
    /// missing or malformed arguments.
    pub fn to_command(&self) -> Result<Command, RelayError> {
        match self.command {
            CommandName::Status => Ok(Command::Status),
            CommandName::Stop => Ok(Command::Stop),
            CommandName::Run => decode_args(self.args.as_ref()).map(Command::Run),
            CommandName::Readline => decode_args(self.args.as_ref()).map(Command::Readline),
        }
    }
}

fn decode_args<T: serde::de::DeserializeOwned>(args: Option<&Value>) -> Result<T, RelayError> {
    let args = args.ok_or_else(|| RelayError::Protocol("missing args".to_string()))?;
    T::deserialize(args).map_err(|e| RelayError::Protocol(e.to_string()))
}
