//! Wire format shared by the console and the command server.
//!
//! Every frame is one JSON document in a WebSocket text message. Requests
//! flow console → server and carry the session token; responses flow
//! server → console and are decoded into the tagged [`Inbound`] variant
//! before anything acts on them.

pub mod request;
pub mod response;

pub use request::{Command, CommandName, ReadlineArgs, Request, RunArgs};
pub use response::{
    ALREADY_RUNNING, FailureKind, INVALID_REQUEST, Inbound, NOT_RUNNING, OutputChunk, OutputStream,
    RemoteStatus, Response, SPAWN_ERROR,
};
