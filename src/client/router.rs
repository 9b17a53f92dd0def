//! Response router: inbound frame → state machine / output sink.

use crate::client::sink::OutputSink;
use crate::client::status::{Status, StatusMachine};
use crate::error::RelayError;
use crate::protocol::{ALREADY_RUNNING, FailureKind, Inbound, RemoteStatus, Response};

/// What the router did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Status payload applied to the state machine.
    Status,
    /// Output forwarded to the sink.
    Output,
    /// Server error forwarded to the sink.
    Failure,
    /// Server rejected the token; status is now `disconnected` and the
    /// caller must close the socket.
    AuthenticationFailed,
    /// Frame was unparseable, of an unknown type, or refused by the state
    /// machine.
    Ignored,
}

/// Routes one inbound text frame.
pub fn route(frame: &str, status: &mut StatusMachine, sink: &mut dyn OutputSink) -> Routed {
    let inbound = match Response::from_frame(frame).and_then(Response::into_inbound) {
        Ok(inbound) => inbound,
        Err(e) => {
            tracing::debug!(error = %e, "dropping malformed frame");
            return Routed::Ignored;
        }
    };

    match inbound {
        Inbound::Failure { kind, error } => {
            sink.diagnostic(&format!("{kind}: {error}"));
            if error == FailureKind::Authentication {
                tracing::warn!("server rejected session token");
                status.force_disconnected();
                return Routed::AuthenticationFailed;
            }
            // The run never started; nothing will report its completion.
            if kind == "run" && !is_already_running(&error) && status.current() == Status::Running {
                let _ = status.transition(Status::Connected);
            }
            Routed::Failure
        }
        Inbound::Status(remote) => match apply_remote_status(status, remote) {
            Ok(()) => Routed::Status,
            Err(_) => Routed::Ignored,
        },
        Inbound::Output(chunk) => {
            sink.output(&chunk);
            Routed::Output
        }
        Inbound::Unknown(kind) => {
            tracing::debug!(%kind, "ignoring response of unknown type");
            Routed::Ignored
        }
    }
}

fn is_already_running(error: &FailureKind) -> bool {
    matches!(error, FailureKind::Other(e) if e == ALREADY_RUNNING)
}

/// Feeds a server-reported status into the machine.
///
/// `running` while still `connecting` (the server was already busy when we
/// attached) walks through `connected` first.
fn apply_remote_status(status: &mut StatusMachine, remote: RemoteStatus) -> Result<(), RelayError> {
    let target = match remote {
        RemoteStatus::Connected => Status::Connected,
        RemoteStatus::Running => Status::Running,
    };
    if status.current() == Status::Connecting && target == Status::Running {
        status.transition(Status::Connected)?;
    }
    status.transition(target).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::sink::{RecordingSink, SinkEvent};
    use crate::protocol::OutputChunk;

    fn machine_at(path: &[Status]) -> StatusMachine {
        let mut m = StatusMachine::new();
        for s in path {
            let _ = m.transition(*s);
        }
        m
    }

    #[test]
    fn first_status_connects() {
        let mut m = machine_at(&[Status::Connecting]);
        let mut sink = RecordingSink::new();
        let routed = route(
            r#"{"success":true,"type":"status","payload":"connected"}"#,
            &mut m,
            &mut sink,
        );
        assert_eq!(routed, Routed::Status);
        assert_eq!(m.current(), Status::Connected);
    }

    #[test]
    fn running_while_connecting_walks_through_connected() {
        let mut m = machine_at(&[Status::Connecting]);
        let mut sink = RecordingSink::new();
        route(
            r#"{"success":true,"type":"status","payload":"running"}"#,
            &mut m,
            &mut sink,
        );
        assert_eq!(m.current(), Status::Running);
    }

    #[test]
    fn completion_status_returns_to_connected() {
        let mut m = machine_at(&[Status::Connecting, Status::Connected, Status::Running]);
        let mut sink = RecordingSink::new();
        route(
            r#"{"success":true,"type":"status","payload":"connected"}"#,
            &mut m,
            &mut sink,
        );
        assert_eq!(m.current(), Status::Connected);
    }

    #[test]
    fn stale_status_while_disconnected_is_ignored() {
        let mut m = StatusMachine::new();
        let mut sink = RecordingSink::new();
        let routed = route(
            r#"{"success":true,"type":"status","payload":"running"}"#,
            &mut m,
            &mut sink,
        );
        assert_eq!(routed, Routed::Ignored);
        assert_eq!(m.current(), Status::Disconnected);
    }

    #[test]
    fn authentication_error_disconnects_from_every_state() {
        let paths: [&[Status]; 4] = [
            &[],
            &[Status::Connecting],
            &[Status::Connecting, Status::Connected],
            &[Status::Connecting, Status::Connected, Status::Running],
        ];
        for path in paths {
            let mut m = machine_at(path);
            let mut sink = RecordingSink::new();
            let routed = route(
                r#"{"success":false,"type":"status","payload":null,"error":"AuthenticationError"}"#,
                &mut m,
                &mut sink,
            );
            assert_eq!(routed, Routed::AuthenticationFailed);
            assert_eq!(m.current(), Status::Disconnected);
            assert_eq!(sink.diagnostics(), vec!["status: AuthenticationError"]);
        }
    }

    #[test]
    fn other_failure_keeps_state() {
        let mut m = machine_at(&[Status::Connecting, Status::Connected, Status::Running]);
        let mut sink = RecordingSink::new();
        let routed = route(
            r#"{"success":false,"type":"run","payload":null,"error":"AlreadyRunning"}"#,
            &mut m,
            &mut sink,
        );
        assert_eq!(routed, Routed::Failure);
        assert_eq!(m.current(), Status::Running);
        assert_eq!(sink.diagnostics(), vec!["run: AlreadyRunning"]);
    }

    #[test]
    fn rejected_run_returns_to_connected() {
        for error in ["SpawnError", "InvalidRequest"] {
            let mut m = machine_at(&[Status::Connecting, Status::Connected, Status::Running]);
            let mut sink = RecordingSink::new();
            let frame =
                format!(r#"{{"success":false,"type":"run","payload":null,"error":"{error}"}}"#);
            assert_eq!(route(&frame, &mut m, &mut sink), Routed::Failure);
            assert_eq!(m.current(), Status::Connected);
            assert_eq!(sink.diagnostics(), vec![format!("run: {error}").as_str()]);
        }
    }

    #[test]
    fn rejected_readline_keeps_running() {
        let mut m = machine_at(&[Status::Connecting, Status::Connected, Status::Running]);
        let mut sink = RecordingSink::new();
        route(
            r#"{"success":false,"type":"readline","payload":null,"error":"InvalidRequest"}"#,
            &mut m,
            &mut sink,
        );
        assert_eq!(m.current(), Status::Running);
    }

    #[test]
    fn output_goes_to_sink() {
        let mut m = machine_at(&[Status::Connecting, Status::Connected, Status::Running]);
        let mut sink = RecordingSink::new();
        route(
            r#"{"success":true,"type":"output","payload":{"stream":"stdout","data":"hi"}}"#,
            &mut m,
            &mut sink,
        );
        assert_eq!(
            sink.events(),
            &[SinkEvent::Output(OutputChunk::stdout("hi"))]
        );
    }

    #[test]
    fn garbage_and_unknown_types_are_ignored() {
        let mut m = machine_at(&[Status::Connecting]);
        let mut sink = RecordingSink::new();
        assert_eq!(route("not json", &mut m, &mut sink), Routed::Ignored);
        assert_eq!(
            route(r#"{"success":true,"type":"heartbeat"}"#, &mut m, &mut sink),
            Routed::Ignored
        );
        assert!(sink.events().is_empty());
        assert_eq!(m.current(), Status::Connecting);
    }
}
