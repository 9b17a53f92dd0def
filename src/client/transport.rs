//! Socket seam between the connection manager and the network.
//!
//! The manager only ever talks to a [`Socket`] obtained from a
//! [`SocketFactory`]. Socket callbacks (open, message, error, close) are
//! delivered as [`SocketEvent`]s on a single channel, tagged with the
//! [`SocketId`] of the socket that produced them, so that events from a
//! socket that has since been replaced can be told apart and dropped.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::error::RelayError;

/// Identifies one socket for the lifetime of a factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(u64);

impl SocketId {
    /// Creates a socket id from a raw counter value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}

/// Callback-style notification from a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The handshake completed; frames may now be sent.
    Open,
    /// One inbound text frame.
    Message(String),
    /// Transport failure. Always followed by [`SocketEvent::Closed`].
    Error(String),
    /// The socket is gone.
    Closed,
}

/// Sending half of the socket event channel.
pub type SocketEventSender = mpsc::UnboundedSender<(SocketId, SocketEvent)>;
/// Receiving half of the socket event channel.
pub type SocketEventReceiver = mpsc::UnboundedReceiver<(SocketId, SocketEvent)>;

/// A single bidirectional text-frame channel.
pub trait Socket: fmt::Debug + Send {
    /// Returns this socket's id.
    fn id(&self) -> SocketId;

    /// Returns `true` between the open event and close.
    fn is_open(&self) -> bool;

    /// Queues one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NotConnected`] if the socket is not open, or
    /// [`RelayError::Socket`] if the transport has gone away.
    fn send(&mut self, frame: String) -> Result<(), RelayError>;

    /// Closes the socket. Idempotent. No further events are delivered for
    /// this socket's id once it returns.
    fn close(&mut self);
}

/// Opens sockets. Injected into the connection manager.
pub trait SocketFactory: fmt::Debug + Send {
    /// Starts opening a socket to `url`. The returned socket is not open
    /// until [`SocketEvent::Open`] arrives for its id.
    fn open(&mut self, url: &str) -> Box<dyn Socket>;
}

/// [`SocketFactory`] backed by `tokio-tungstenite`.
///
/// Each socket runs in its own tokio task that only shuttles frames
/// between the network and the event channel; all state lives with the
/// manager.
#[derive(Debug)]
pub struct WsSocketFactory {
    events: SocketEventSender,
    next_id: u64,
}

impl WsSocketFactory {
    /// Creates a factory and the receiver on which all of its sockets
    /// report events.
    #[must_use]
    pub fn new() -> (Self, SocketEventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events, next_id: 0 }, rx)
    }
}

impl SocketFactory for WsSocketFactory {
    fn open(&mut self, url: &str) -> Box<dyn Socket> {
        self.next_id += 1;
        let id = SocketId::new(self.next_id);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));

        tracing::debug!(%id, url, "opening websocket");
        let task = tokio::spawn(run_socket(
            id,
            url.to_string(),
            outbound_rx,
            self.events.clone(),
            Arc::clone(&open),
        ));

        Box::new(WsSocket {
            id,
            outbound,
            open,
            task,
        })
    }
}

/// A `tokio-tungstenite` client socket.
#[derive(Debug)]
pub struct WsSocket {
    id: SocketId,
    outbound: mpsc::UnboundedSender<String>,
    open: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Socket for WsSocket {
    fn id(&self) -> SocketId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn send(&mut self, frame: String) -> Result<(), RelayError> {
        if !self.is_open() {
            return Err(RelayError::NotConnected);
        }
        self.outbound
            .send(frame)
            .map_err(|_| RelayError::Socket("socket task has exited".to_string()))
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::Release);
        self.task.abort();
    }
}

impl Drop for WsSocket {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Socket task: connect, then pump frames until either side hangs up.
async fn run_socket(
    id: SocketId,
    url: String,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: SocketEventSender,
    open: Arc<AtomicBool>,
) {
    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::warn!(%id, %url, error = %e, "websocket connect failed");
            let _ = events.send((id, SocketEvent::Error(e.to_string())));
            let _ = events.send((id, SocketEvent::Closed));
            return;
        }
    };

    open.store(true, Ordering::Release);
    let _ = events.send((id, SocketEvent::Open));
    let (mut ws_tx, mut ws_rx) = stream.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(text) = frame else {
                    let _ = ws_tx.close().await;
                    break;
                };
                if let Err(e) = ws_tx.send(Message::text(text)).await {
                    let _ = events.send((id, SocketEvent::Error(e.to_string())));
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let _ = events.send((id, SocketEvent::Message(text.as_str().to_owned())));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        let _ = events.send((id, SocketEvent::Error(e.to_string())));
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    open.store(false, Ordering::Release);
    let _ = events.send((id, SocketEvent::Closed));
    tracing::debug!(%id, "websocket closed");
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted in-memory sockets for unit tests.

    use std::sync::{Arc, Mutex};

    use super::*;

    /// Observable state of one mock socket.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct MockSocketState {
        pub url: String,
        pub open: bool,
        pub closed: bool,
        pub sent: Vec<String>,
    }

    /// Test-side view of every socket a [`MockSocketFactory`] opened.
    #[derive(Debug, Clone)]
    pub(crate) struct MockNetwork {
        sockets: Arc<Mutex<Vec<MockSocketState>>>,
        events: SocketEventSender,
    }

    impl MockNetwork {
        fn with<R>(&self, f: impl FnOnce(&mut Vec<MockSocketState>) -> R) -> R {
            let mut guard = match self.sockets.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut *guard)
        }

        pub(crate) fn opened(&self) -> usize {
            self.with(|s| s.len())
        }

        pub(crate) fn socket(&self, id: SocketId) -> MockSocketState {
            self.with(|s| s.get(index(id)).cloned().unwrap_or_default())
        }

        pub(crate) fn open_count(&self) -> usize {
            self.with(|s| s.iter().filter(|st| st.open).count())
        }

        /// Marks the socket open, as the transport would after a handshake.
        pub(crate) fn accept(&self, id: SocketId) {
            self.with(|s| {
                if let Some(st) = s.get_mut(index(id)) {
                    st.open = true;
                }
            });
        }

        /// Marks the socket closed from the far side.
        pub(crate) fn drop_remote(&self, id: SocketId) {
            self.with(|s| {
                if let Some(st) = s.get_mut(index(id)) {
                    st.open = false;
                }
            });
        }

        pub(crate) fn emit(&self, id: SocketId, event: SocketEvent) {
            let _ = self.events.send((id, event));
        }
    }

    fn index(id: SocketId) -> usize {
        usize::try_from(id.0.saturating_sub(1)).unwrap_or(usize::MAX)
    }

    /// Factory producing [`MockSocket`]s.
    #[derive(Debug)]
    pub(crate) struct MockSocketFactory {
        network: MockNetwork,
    }

    impl MockSocketFactory {
        pub(crate) fn new() -> (Self, MockNetwork, SocketEventReceiver) {
            let (events, rx) = mpsc::unbounded_channel();
            let network = MockNetwork {
                sockets: Arc::new(Mutex::new(Vec::new())),
                events,
            };
            (
                Self {
                    network: network.clone(),
                },
                network,
                rx,
            )
        }
    }

    impl SocketFactory for MockSocketFactory {
        fn open(&mut self, url: &str) -> Box<dyn Socket> {
            let raw = self.network.with(|s| {
                s.push(MockSocketState {
                    url: url.to_string(),
                    ..MockSocketState::default()
                });
                s.len()
            });
            Box::new(MockSocket {
                id: SocketId::new(raw as u64),
                network: self.network.clone(),
            })
        }
    }

    #[derive(Debug)]
    pub(crate) struct MockSocket {
        id: SocketId,
        network: MockNetwork,
    }

    impl Socket for MockSocket {
        fn id(&self) -> SocketId {
            self.id
        }

        fn is_open(&self) -> bool {
            self.network.socket(self.id).open
        }

        fn send(&mut self, frame: String) -> Result<(), RelayError> {
            if !self.is_open() {
                return Err(RelayError::NotConnected);
            }
            let id = self.id;
            self.network.with(|s| {
                if let Some(st) = s.get_mut(index(id)) {
                    st.sent.push(frame);
                }
            });
            Ok(())
        }

        fn close(&mut self) {
            let id = self.id;
            self.network.with(|s| {
                if let Some(st) = s.get_mut(index(id)) {
                    st.open = false;
                    st.closed = true;
                }
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::mock::MockSocketFactory;
    use super::*;

    #[test]
    fn socket_id_display() {
        assert_eq!(SocketId::new(3).to_string(), "socket#3");
    }

    #[test]
    fn mock_socket_refuses_send_until_open() {
        let (mut factory, net, _rx) = MockSocketFactory::new();
        let mut socket = factory.open("ws://localhost:4000/");
        assert!(matches!(
            socket.send("x".to_string()),
            Err(RelayError::NotConnected)
        ));
        net.accept(socket.id());
        assert!(socket.send("x".to_string()).is_ok());
        assert_eq!(net.socket(socket.id()).sent, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn ws_socket_reports_connect_failure() {
        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        drop(listener);

        let (mut factory, mut rx) = WsSocketFactory::new();
        let socket = factory.open(&format!("ws://{addr}/"));
        assert!(!socket.is_open());

        let Some((id, first)) = rx.recv().await else {
            panic!("expected an event");
        };
        assert_eq!(id, socket.id());
        assert!(matches!(first, SocketEvent::Error(_)));

        let Some((_, second)) = rx.recv().await else {
            panic!("expected close event");
        };
        assert_eq!(second, SocketEvent::Closed);
    }
}
