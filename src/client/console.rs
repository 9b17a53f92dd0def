//! The console: the owned UI object sitting on top of the connection
//! manager.
//!
//! It turns input lines into commands, keeps session parameters in sync
//! with the preference store, and re-establishes the socket when a
//! parameter changes under a live session.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::client::connection::{ConnectionManager, SessionParams};
use crate::client::sink::OutputSink;
use crate::client::status::Status;
use crate::client::transport::{SocketEvent, SocketFactory, SocketId};
use crate::config::ConsoleConfig;
use crate::error::RelayError;
use crate::protocol::{Command, OutputChunk, ReadlineArgs, RunArgs};
use crate::storage::{PreferenceStore, Preferences};

const HELP: &str = "\
commands:
  connect [host] [port] [token]   open a session (host may be omitted)
  disconnect                      close the session
  status                          query the server status
  run [command line]              run a command (default: last one)
  stop                            stop the running command
  send <line>                     write a line to the command's stdin
  port <n> | token <t>            change a parameter (reconnects if live)
  record <json>                   store a recording for the next run
  quit
";

/// One parsed line of console input.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    /// Open a session, optionally overriding parameters.
    Connect {
        /// Host override.
        host: Option<String>,
        /// Port override (persisted).
        port: Option<u16>,
        /// Token override (persisted).
        token: Option<String>,
    },
    /// Close the session.
    Disconnect,
    /// Status query.
    Status,
    /// Run a command line, or the stored one when `None`.
    Run(Option<String>),
    /// Stop the running command.
    Stop,
    /// Send one stdin line.
    Send(String),
    /// Change the port.
    Port(u16),
    /// Change the token.
    Token(String),
    /// Store a recording document.
    Record(Value),
    /// Print usage.
    Help,
    /// Leave the console.
    Quit,
}

impl FromStr for ConsoleInput {
    type Err = RelayError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_start();
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest_trimmed = rest.trim();

        match verb {
            "connect" => {
                let mut parts = rest_trimmed.split_whitespace().peekable();
                // A leading number is the port; the host is then the default.
                let host = parts
                    .next_if(|p| p.parse::<u16>().is_err())
                    .map(str::to_string);
                let port = parts.next().map(parse_port).transpose()?;
                let token = parts.next().map(str::to_string);
                Ok(Self::Connect { host, port, token })
            }
            "disconnect" => Ok(Self::Disconnect),
            "status" => Ok(Self::Status),
            "run" => Ok(Self::Run(
                Some(rest_trimmed.to_string()).filter(|c| !c.is_empty()),
            )),
            "stop" => Ok(Self::Stop),
            "send" => Ok(Self::Send(rest.trim_end_matches(['\r', '\n']).to_string())),
            "port" => parse_port(rest_trimmed).map(Self::Port),
            "token" if !rest_trimmed.is_empty() => Ok(Self::Token(rest_trimmed.to_string())),
            "token" => Err(RelayError::InvalidInput("token needs a value".to_string())),
            "record" => Ok(Self::Record(serde_json::from_str(rest_trimmed)?)),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(RelayError::InvalidInput(format!(
                "unknown command `{other}`, try `help`"
            ))),
        }
    }
}

fn parse_port(s: &str) -> Result<u16, RelayError> {
    s.parse()
        .map_err(|_| RelayError::InvalidInput(format!("invalid port `{s}`")))
}

/// Whether the input loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading input.
    Continue,
    /// Shut down.
    Quit,
}

/// The console UI object.
pub struct Console<F, S, P> {
    manager: ConnectionManager<F, S>,
    store: P,
    prefs: Preferences,
    host: String,
    default_port: u16,
    default_token: Option<String>,
}

impl<F: fmt::Debug, S, P> fmt::Debug for Console<F, S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("manager", &self.manager)
            .field("host", &self.host)
            .field("prefs", &self.prefs)
            .finish_non_exhaustive()
    }
}

impl<F: SocketFactory, S: OutputSink, P: PreferenceStore> Console<F, S, P> {
    /// Creates a console, prepopulating parameters from `store`.
    ///
    /// Unreadable preferences are logged and replaced by defaults.
    pub fn new(manager: ConnectionManager<F, S>, store: P, config: &ConsoleConfig) -> Self {
        let prefs = store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring unreadable preferences");
            Preferences::default()
        });
        Self {
            manager,
            store,
            prefs,
            host: config.host.clone(),
            default_port: config.port,
            default_token: config.token.clone(),
        }
    }

    /// Borrow of the connection manager.
    #[must_use]
    pub const fn manager(&self) -> &ConnectionManager<F, S> {
        &self.manager
    }

    /// Current preferences.
    #[must_use]
    pub const fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    /// Borrow of the preference store.
    #[must_use]
    pub const fn store(&self) -> &P {
        &self.store
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn status(&self) -> Status {
        self.manager.status()
    }

    /// Returns `true` while the liveness probe must tick.
    #[must_use]
    pub const fn probe_active(&self) -> bool {
        self.manager.probe_active()
    }

    /// Session parameters for the next connect.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidInput`] if no token is known.
    pub fn params(&self) -> Result<SessionParams, RelayError> {
        let token = self
            .prefs
            .token
            .clone()
            .or_else(|| self.default_token.clone())
            .ok_or_else(|| {
                RelayError::InvalidInput(
                    "no token set; use `token <value>` or RELAY_TOKEN".to_string(),
                )
            })?;
        Ok(SessionParams {
            host: self.host.clone(),
            port: self.prefs.port.unwrap_or(self.default_port),
            token,
        })
    }

    /// Parses and handles one input line, reporting errors to the sink.
    pub fn handle_line(&mut self, line: &str) -> Flow {
        if line.trim().is_empty() {
            return Flow::Continue;
        }
        match line.parse().and_then(|input| self.handle(input)) {
            Ok(flow) => flow,
            Err(e) => {
                self.report(&e);
                Flow::Continue
            }
        }
    }

    /// Handles one parsed input.
    ///
    /// # Errors
    ///
    /// Returns whatever the dispatch, parameter or storage step failed
    /// with. The session state has already been made consistent.
    pub fn handle(&mut self, input: ConsoleInput) -> Result<Flow, RelayError> {
        match input {
            ConsoleInput::Connect { host, port, token } => {
                if let Some(host) = host {
                    self.host = host;
                }
                if port.is_some() || token.is_some() {
                    self.update_prefs(|p| {
                        if port.is_some() {
                            p.port = port;
                        }
                        if token.is_some() {
                            p.token = token;
                        }
                    })?;
                }
                let params = self.params()?;
                self.manager.connect(params);
            }
            ConsoleInput::Disconnect => self.manager.disconnect(),
            ConsoleInput::Status => {
                let status = self.manager.status();
                self.manager
                    .sink_mut()
                    .diagnostic(&format!("status: {status}"));
                if status != Status::Disconnected {
                    self.manager.dispatch(&Command::Status)?;
                }
            }
            ConsoleInput::Run(command_line) => {
                let command_line = match command_line {
                    Some(line) => {
                        let stored = line.clone();
                        self.update_prefs(|p| p.command_line = Some(stored))?;
                        line
                    }
                    None => self.prefs.command_line.clone().ok_or_else(|| {
                        RelayError::InvalidInput("no command line to run".to_string())
                    })?,
                };
                self.manager.dispatch(&Command::Run(RunArgs {
                    command_line,
                    recording: self.prefs.last_recording.clone(),
                }))?;
            }
            ConsoleInput::Stop => self.manager.dispatch(&Command::Stop)?,
            ConsoleInput::Send(line) => self
                .manager
                .dispatch(&Command::Readline(ReadlineArgs { line }))?,
            ConsoleInput::Port(port) => {
                self.update_prefs(|p| p.port = Some(port))?;
                self.reconnect_if_live()?;
            }
            ConsoleInput::Token(token) => {
                self.update_prefs(|p| p.token = Some(token))?;
                self.reconnect_if_live()?;
            }
            ConsoleInput::Record(recording) => {
                self.update_prefs(|p| p.last_recording = Some(recording))?;
            }
            ConsoleInput::Help => self.manager.sink_mut().output(&OutputChunk::stdout(HELP)),
            ConsoleInput::Quit => {
                self.manager.disconnect();
                return Ok(Flow::Quit);
            }
        }
        Ok(Flow::Continue)
    }

    /// Forwards a socket callback to the manager.
    pub fn handle_socket_event(&mut self, id: SocketId, event: SocketEvent) {
        self.manager.handle_socket_event(id, event);
    }

    /// Forwards a liveness-probe tick to the manager.
    pub fn probe_tick(&mut self) {
        self.manager.probe_tick();
    }

    /// Closes the session.
    pub fn shutdown(&mut self) {
        self.manager.disconnect();
    }

    /// Surfaces an error to the user.
    pub fn report(&mut self, error: &RelayError) {
        tracing::debug!(error = %error, "console command failed");
        self.manager.sink_mut().diagnostic(&error.to_string());
    }

    fn update_prefs(&mut self, edit: impl FnOnce(&mut Preferences)) -> Result<(), RelayError> {
        edit(&mut self.prefs);
        self.prefs.updated_at = Some(chrono::Utc::now());
        self.store.save(&self.prefs)
    }

    /// Re-establishes the socket after a parameter change.
    fn reconnect_if_live(&mut self) -> Result<(), RelayError> {
        if self.manager.status() == Status::Disconnected {
            return Ok(());
        }
        let params = self.params()?;
        tracing::info!(port = params.port, "parameters changed, reconnecting");
        self.manager.connect(params);
        Ok(())
    }
}
