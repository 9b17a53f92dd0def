//! Console side of the relay.
//!
//! ```text
//! input lines ──▶ Console ──▶ ConnectionManager ──▶ dispatcher ──▶ Socket
//!                                  ▲                                 │
//!                    StatusMachine ◀── router ◀── SocketEvent ◀──────┘
//!                                         └──▶ OutputSink
//! ```
//!
//! Everything above the [`transport`] seam is synchronous and driven by
//! the single [`driver`] task.

pub mod connection;
pub mod console;
pub mod dispatcher;
pub mod driver;
pub mod router;
pub mod sink;
pub mod status;
pub mod transport;

pub use connection::{ConnectionManager, SessionParams};
pub use console::{Console, ConsoleInput, Flow};
pub use sink::{OutputSink, RecordingSink, SinkEvent, TerminalSink};
pub use status::{Status, StatusMachine};
pub use transport::{Socket, SocketEvent, SocketFactory, SocketId, WsSocketFactory};
