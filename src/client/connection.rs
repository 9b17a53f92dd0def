//! Connection manager: owns the one socket and the session lifecycle.
//!
//! All mutation funnels through `&mut self` on the driver task, so the
//! manager is the sole writer of both the socket and the [`StatusMachine`].

use std::fmt;

use crate::client::dispatcher;
use crate::client::router::{self, Routed};
use crate::client::sink::OutputSink;
use crate::client::status::{Status, StatusMachine};
use crate::client::transport::{Socket, SocketEvent, SocketFactory, SocketId};
use crate::error::RelayError;
use crate::protocol::Command;

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Shared authentication token.
    pub token: String,
}

impl SessionParams {
    /// Returns the WebSocket URL for these parameters.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}:{}/", self.host, self.port)
    }
}

/// One connect-to-disconnect lifecycle.
#[derive(Debug)]
struct Session {
    params: SessionParams,
    socket: Box<dyn Socket>,
}

/// Owns the session, the socket factory and the output sink.
pub struct ConnectionManager<F, S> {
    factory: F,
    sink: S,
    status: StatusMachine,
    session: Option<Session>,
}

impl<F: fmt::Debug, S> fmt::Debug for ConnectionManager<F, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("factory", &self.factory)
            .field("status", &self.status.current())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl<F: SocketFactory, S: OutputSink> ConnectionManager<F, S> {
    /// Creates a disconnected manager.
    #[must_use]
    pub fn new(factory: F, sink: S) -> Self {
        Self {
            factory,
            sink,
            status: StatusMachine::new(),
            session: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status.current()
    }

    /// Parameters of the live session, if any.
    #[must_use]
    pub fn params(&self) -> Option<&SessionParams> {
        self.session.as_ref().map(|s| &s.params)
    }

    /// Id of the live socket, if any.
    #[must_use]
    pub fn socket_id(&self) -> Option<SocketId> {
        self.session.as_ref().map(|s| s.socket.id())
    }

    /// Returns `true` while the liveness probe must tick.
    #[must_use]
    pub const fn probe_active(&self) -> bool {
        self.status.current().is_live()
    }

    /// Borrow of the output sink.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable borrow of the output sink.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Opens a socket for `params`, closing any existing one first.
    ///
    /// The status query is sent once the socket reports open.
    pub fn connect(&mut self, params: SessionParams) {
        if self.session.is_some() {
            tracing::info!("closing existing socket before reconnecting");
            self.disconnect();
        }

        let url = params.url();
        self.set_status(Status::Connecting);
        let socket = self.factory.open(&url);
        tracing::info!(socket = %socket.id(), %url, "connecting");
        self.session = Some(Session { params, socket });
    }

    /// Closes the socket unconditionally and ends the session.
    pub fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            tracing::info!(socket = %session.socket.id(), "disconnecting");
            session.socket.close();
        }
        self.force_disconnected();
    }

    /// Sends `command` on the live socket.
    ///
    /// `run` is only accepted while `connected` and moves the session to
    /// `running`; `stop` without an open socket forces `disconnected`.
    ///
    /// # Errors
    ///
    /// - [`RelayError::NotConnected`] if no socket is open.
    /// - [`RelayError::RunInProgress`] for `run` while `running`.
    /// - [`RelayError::IllegalTransition`] for `run` while `connecting`.
    /// - Any socket send error.
    pub fn dispatch(&mut self, command: &Command) -> Result<(), RelayError> {
        let socket_open = self.session.as_ref().is_some_and(|s| s.socket.is_open());
        if !socket_open {
            if matches!(command, Command::Stop) {
                self.drop_session("stop requested without an open socket");
            }
            return Err(RelayError::NotConnected);
        }

        if matches!(command, Command::Run(_)) {
            let current = self.status.current();
            if current == Status::Running {
                return Err(RelayError::RunInProgress);
            }
            if !current.can_transition_to(Status::Running) {
                tracing::error!(from = %current, "run refused in this state");
                return Err(RelayError::IllegalTransition {
                    from: current,
                    to: Status::Running,
                });
            }
        }

        let Some(session) = self.session.as_mut() else {
            return Err(RelayError::NotConnected);
        };
        if let Err(e) = dispatcher::dispatch(session.socket.as_mut(), &session.params.token, command)
        {
            if e.is_connection_error() {
                self.fail(&format!("send failed: {e}"));
            }
            return Err(e);
        }

        if matches!(command, Command::Run(_)) {
            self.set_status(Status::Running);
        }
        Ok(())
    }

    /// Handles one socket callback. Events from any socket other than the
    /// live one are dropped.
    pub fn handle_socket_event(&mut self, id: SocketId, event: SocketEvent) {
        if self.socket_id() != Some(id) {
            tracing::debug!(socket = %id, ?event, "dropping event from stale socket");
            return;
        }

        match event {
            SocketEvent::Open => {
                tracing::info!(socket = %id, "socket open, querying status");
                if let Err(e) = self.dispatch(&Command::Status) {
                    self.fail(&format!("initial status query failed: {e}"));
                }
            }
            SocketEvent::Message(frame) => self.route(&frame),
            SocketEvent::Error(msg) => self.fail(&format!("connection error: {msg}")),
            SocketEvent::Closed => self.fail("connection closed"),
        }
    }

    /// One liveness-probe tick: query status, or drop the session if the
    /// socket has silently gone away.
    pub fn probe_tick(&mut self) {
        if !self.probe_active() {
            return;
        }
        let socket_open = self.session.as_ref().is_some_and(|s| s.socket.is_open());
        if !socket_open {
            self.fail("liveness probe found the socket closed");
            return;
        }
        if let Err(e) = self.dispatch(&Command::Status) {
            tracing::warn!(error = %e, "liveness probe failed");
        }
    }

    fn route(&mut self, frame: &str) {
        let before = self.status.current();
        let routed = router::route(frame, &mut self.status, &mut self.sink);
        if routed == Routed::AuthenticationFailed {
            self.drop_session("authentication failed");
        }
        self.notify_if_changed(before);
    }

    /// Surfaces `message` and ends the session.
    fn fail(&mut self, message: &str) {
        tracing::warn!(message, "session failed");
        self.sink.diagnostic(message);
        self.drop_session(message);
    }

    fn drop_session(&mut self, reason: &str) {
        if let Some(mut session) = self.session.take() {
            tracing::debug!(socket = %session.socket.id(), reason, "closing socket");
            session.socket.close();
        }
        self.force_disconnected();
    }

    fn force_disconnected(&mut self) {
        if self.status.force_disconnected() {
            self.sink.status_changed(Status::Disconnected);
        }
    }

    fn set_status(&mut self, to: Status) {
        if let Ok(true) = self.status.transition(to) {
            self.sink.status_changed(to);
        }
    }

    fn notify_if_changed(&mut self, before: Status) {
        let after = self.status.current();
        if after != before {
            self.sink.status_changed(after);
        }
    }
}
