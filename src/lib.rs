//! # relay-console
//!
//! Control channel between a developer console and a local
//! command-execution server, over a single WebSocket.
//!
//! The console sends token-tagged `status` / `run` / `stop` / `readline`
//! requests; the server runs the command line, streams its output back
//! and reports when it finishes. A small state machine on the console
//! side tracks the session lifecycle.
//!
//! ## Architecture
//!
//! ```text
//! relay-console (client/)                      relay-server (server/)
//!     │                                             │
//!     ├── Console (input, preferences)              ├── WS Handler
//!     ├── ConnectionManager ── Socket ── ws ──────▶ ├── run_connection
//!     ├── Dispatcher / Router                       ├── RunningCommand
//!     └── StatusMachine                             └── child process
//! ```

pub mod app_state;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod storage;
