//! Per-connection request loop of the command server.
//!
//! Handles the read/write loop for a single WebSocket connection:
//! authenticates and executes requests, and forwards child output and
//! completion as response frames.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::process::{ProcessEvent, RunningCommand};
use crate::app_state::AppState;
use crate::error::AUTHENTICATION_ERROR;
use crate::protocol::{
    ALREADY_RUNNING, Command, INVALID_REQUEST, NOT_RUNNING, RemoteStatus, Request, Response,
    SPAWN_ERROR,
};

/// Runs the read/write loop for a single WebSocket connection.
///
/// At most one child runs per connection. Closing the socket drops the
/// [`RunningCommand`], which kills the child.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (proc_tx, mut proc_rx) = mpsc::unbounded_channel();
    let mut running: Option<RunningCommand> = None;

    tracing::debug!("ws connection opened");

    loop {
        let response = tokio::select! {
            // Incoming request from the console
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_request(&text, &state, &mut running, &proc_tx)
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "ws receive failed");
                        break;
                    }
                    _ => None,
                }
            }
            // Output or exit from the child
            Some(event) = proc_rx.recv() => {
                match event {
                    ProcessEvent::Output(chunk) => Some(Response::output(&chunk)),
                    ProcessEvent::Exited { code } => {
                        tracing::info!(?code, "run finished");
                        running = None;
                        Some(Response::status(RemoteStatus::Connected))
                    }
                }
            }
        };

        let Some(response) = response else {
            continue;
        };
        let Ok(json) = response.to_frame() else {
            tracing::warn!(kind = %response.kind, "failed to encode response");
            continue;
        };
        if ws_tx.send(Message::text(json)).await.is_err() {
            break;
        }
    }

    if let Some(mut command) = running.take() {
        command.kill();
    }
    tracing::debug!("ws connection closed");
}

/// Handles one request frame, returning the immediate response, if any.
///
/// `stop` and `readline` answer only on failure; their effect shows up as
/// later output and status frames. Nothing here waits on the child, so a
/// command that ignores its stdin cannot stall the connection.
fn handle_request(
    text: &str,
    state: &AppState,
    running: &mut Option<RunningCommand>,
    events: &mpsc::UnboundedSender<ProcessEvent>,
) -> Option<Response> {
    let request = match Request::from_frame(text) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "malformed request");
            return Some(Response::failure("request", INVALID_REQUEST));
        }
    };
    let kind = request.command.to_string();

    if !state.authorize(&request.token) {
        tracing::warn!(command = %kind, "request with invalid token");
        return Some(Response::failure(kind, AUTHENTICATION_ERROR));
    }

    let command = match request.to_command() {
        Ok(command) => command,
        Err(e) => {
            tracing::debug!(command = %kind, error = %e, "invalid arguments");
            return Some(Response::failure(kind, INVALID_REQUEST));
        }
    };

    match command {
        Command::Status => Some(Response::status(if running.is_some() {
            RemoteStatus::Running
        } else {
            RemoteStatus::Connected
        })),
        Command::Run(args) => {
            if running.is_some() {
                return Some(Response::failure(kind, ALREADY_RUNNING));
            }
            match RunningCommand::spawn(&state.shell, &args, events.clone()) {
                Ok(command) => {
                    *running = Some(command);
                    Some(Response::status(RemoteStatus::Running))
                }
                Err(e) => {
                    tracing::warn!(error = %e, command_line = %args.command_line, "spawn failed");
                    Some(Response::failure(kind, SPAWN_ERROR))
                }
            }
        }
        Command::Stop => match running.as_mut() {
            Some(command) => {
                command.kill();
                None
            }
            None => Some(Response::failure(kind, NOT_RUNNING)),
        },
        Command::Readline(args) => match running.as_ref() {
            Some(command) => match command.write_line(&args.line) {
                Ok(()) => None,
                Err(e) => {
                    tracing::debug!(error = %e, "stdin write failed");
                    Some(Response::failure(kind, NOT_RUNNING))
                }
            },
            None => Some(Response::failure(kind, NOT_RUNNING)),
        },
    }
}
