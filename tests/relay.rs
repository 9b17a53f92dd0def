//! End-to-end: real server, real `tokio-tungstenite` client transport.

#![cfg(unix)]
#![allow(clippy::panic, missing_docs)]

use std::net::SocketAddr;
use std::time::Duration;

use relay_console::app_state::AppState;
use relay_console::client::transport::SocketEventReceiver;
use relay_console::client::{
    ConnectionManager, RecordingSink, SessionParams, Status, WsSocketFactory,
};
use relay_console::protocol::{Command, ReadlineArgs, RunArgs};
use relay_console::server::{self, process::Shell};

type Manager = ConnectionManager<WsSocketFactory, RecordingSink>;

const TOKEN: &str = "integration-token";

fn sh() -> Shell {
    Shell {
        program: "sh".to_string(),
        flag: "-c".to_string(),
    }
}

async fn start_server() -> SocketAddr {
    start_server_with(sh()).await
}

async fn start_server_with(shell: Shell) -> SocketAddr {
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    let state = AppState::new(TOKEN, shell);
    tokio::spawn(async move {
        let _ = axum::serve(listener, server::build_router(state)).await;
    });
    addr
}

fn params(addr: SocketAddr, token: &str) -> SessionParams {
    SessionParams {
        host: addr.ip().to_string(),
        port: addr.port(),
        token: token.to_string(),
    }
}

/// Feeds socket events into the manager until `done` holds.
async fn pump_until(
    manager: &mut Manager,
    events: &mut SocketEventReceiver,
    done: impl Fn(&Manager) -> bool,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !done(manager) {
        let next = tokio::time::timeout_at(deadline, events.recv()).await;
        let Ok(Some((id, event))) = next else {
            panic!(
                "condition not reached; status {} events {:?}",
                manager.status(),
                manager.sink().events()
            );
        };
        manager.handle_socket_event(id, event);
    }
}

async fn connected(addr: SocketAddr) -> (Manager, SocketEventReceiver) {
    let (factory, mut events) = WsSocketFactory::new();
    let mut manager = ConnectionManager::new(factory, RecordingSink::new());
    manager.connect(params(addr, TOKEN));
    assert_eq!(manager.status(), Status::Connecting);
    pump_until(&mut manager, &mut events, |m| m.status() == Status::Connected).await;
    (manager, events)
}

fn run(line: &str) -> Command {
    Command::Run(RunArgs {
        command_line: line.to_string(),
        recording: None,
    })
}

#[tokio::test]
async fn run_streams_output_and_returns_to_connected() {
    let addr = start_server().await;
    let (mut manager, mut events) = connected(addr).await;

    tokio_test::assert_ok!(manager.dispatch(&run("echo hello; echo oops >&2")));
    assert_eq!(manager.status(), Status::Running);

    pump_until(&mut manager, &mut events, |m| {
        m.status() == Status::Connected && m.sink().output_text().contains("oops")
    })
    .await;

    let text = manager.sink().output_text();
    assert!(text.contains("hello\n"), "output was {text:?}");
    assert!(manager.probe_active());
    manager.disconnect();
    assert_eq!(manager.status(), Status::Disconnected);
}

#[tokio::test]
async fn readline_feeds_the_running_command() {
    let addr = start_server().await;
    let (mut manager, mut events) = connected(addr).await;

    tokio_test::assert_ok!(manager.dispatch(&run("read answer; echo got $answer")));
    tokio_test::assert_ok!(manager.dispatch(&Command::Readline(ReadlineArgs {
        line: "42".to_string(),
    })));

    pump_until(&mut manager, &mut events, |m| {
        m.status() == Status::Connected && m.sink().output_text().contains("got 42")
    })
    .await;
}

#[tokio::test]
async fn stop_kills_the_command() {
    let addr = start_server().await;
    let (mut manager, mut events) = connected(addr).await;

    tokio_test::assert_ok!(manager.dispatch(&run("exec sleep 30")));
    assert!(matches!(
        manager.dispatch(&run("echo again")),
        Err(relay_console::error::RelayError::RunInProgress)
    ));
    tokio_test::assert_ok!(manager.dispatch(&Command::Stop));

    pump_until(&mut manager, &mut events, |m| m.status() == Status::Connected).await;
}

#[tokio::test]
async fn failed_spawn_leaves_session_ready_for_another_run() {
    let addr = start_server_with(Shell {
        program: "/nonexistent/shell".to_string(),
        flag: "-c".to_string(),
    })
    .await;
    let (mut manager, mut events) = connected(addr).await;

    tokio_test::assert_ok!(manager.dispatch(&run("echo hi")));
    pump_until(&mut manager, &mut events, |m| {
        !m.sink().diagnostics().is_empty()
    })
    .await;

    assert_eq!(manager.sink().diagnostics(), vec!["run: SpawnError"]);
    assert_eq!(manager.status(), Status::Connected);
    tokio_test::assert_ok!(manager.dispatch(&run("echo again")));
}

#[tokio::test]
async fn wrong_token_disconnects() {
    let addr = start_server().await;
    let (factory, mut events) = WsSocketFactory::new();
    let mut manager = ConnectionManager::new(factory, RecordingSink::new());
    manager.connect(params(addr, "wrong"));

    pump_until(&mut manager, &mut events, |m| {
        m.status() == Status::Disconnected && !m.sink().diagnostics().is_empty()
    })
    .await;

    assert!(manager.socket_id().is_none());
    assert_eq!(
        manager.sink().diagnostics(),
        vec!["status: AuthenticationError"]
    );
}

#[tokio::test]
async fn unreachable_server_surfaces_diagnostic() {
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    drop(listener);

    let (factory, mut events) = WsSocketFactory::new();
    let mut manager = ConnectionManager::new(factory, RecordingSink::new());
    manager.connect(params(addr, TOKEN));
    pump_until(&mut manager, &mut events, |m| m.status() == Status::Disconnected).await;

    let diagnostics = manager.sink().diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics.iter().all(|d| d.starts_with("connection error")));
}
