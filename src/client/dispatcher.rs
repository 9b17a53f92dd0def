//! Command dispatcher: typed command → token-tagged request frame → socket.
//!
//! Dispatch is fire-and-forget. There is no correlation id; the response
//! that answers a request is recognised by its `type` alone.

use crate::client::transport::Socket;
use crate::error::RelayError;
use crate::protocol::{Command, Request};

/// Encodes `command` with `token` and sends it on `socket`.
///
/// # Errors
///
/// Returns [`RelayError::NotConnected`] if the socket is not open, or
/// the socket's own error if the send fails.
pub fn dispatch(socket: &mut dyn Socket, token: &str, command: &Command) -> Result<(), RelayError> {
    if !socket.is_open() {
        return Err(RelayError::NotConnected);
    }
    let frame = Request::new(token, command)?.to_frame()?;
    tracing::debug!(socket = %socket.id(), command = %command.name(), "dispatching command");
    socket.send(frame)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::client::transport::SocketFactory;
    use crate::client::transport::mock::MockSocketFactory;
    use crate::protocol::{CommandName, ReadlineArgs};

    #[test]
    fn dispatch_on_closed_socket_fails() {
        let (mut factory, net, _rx) = MockSocketFactory::new();
        let mut socket = factory.open("ws://h:1/");
        let result = dispatch(socket.as_mut(), "tok", &Command::Status);
        assert!(matches!(result, Err(RelayError::NotConnected)));
        assert!(net.socket(socket.id()).sent.is_empty());
    }

    #[test]
    fn dispatch_tags_frame_with_token() {
        let (mut factory, net, _rx) = MockSocketFactory::new();
        let mut socket = factory.open("ws://h:1/");
        net.accept(socket.id());

        let cmd = Command::Readline(ReadlineArgs {
            line: "y".to_string(),
        });
        tokio_test::assert_ok!(dispatch(socket.as_mut(), "tok", &cmd));

        let sent = net.socket(socket.id()).sent;
        let Some(frame) = sent.first() else {
            panic!("nothing sent");
        };
        let Ok(req) = Request::from_frame(frame) else {
            panic!("sent frame is not a request");
        };
        assert_eq!(req.token, "tok");
        assert_eq!(req.command, CommandName::Readline);
    }
}
