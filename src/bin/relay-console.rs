//! relay-console entry point.
//!
//! Reads console commands from stdin, one per line, and drives a session
//! against a running `relay-server`.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use relay_console::client::{Console, ConnectionManager, TerminalSink, WsSocketFactory, driver};
use relay_console::config::ConsoleConfig;
use relay_console::storage::JsonFileStore;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ConsoleConfig::from_env()?;
    let store = JsonFileStore::new(&config.prefs_path);
    tracing::info!(prefs = %store.path().display(), host = %config.host, "starting relay-console");

    let (factory, socket_events) = WsSocketFactory::new();
    let manager = ConnectionManager::new(factory, TerminalSink);
    let mut console = Console::new(manager, store, &config);

    let (input_tx, input_rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if input_tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });

    eprintln!("relay-console: type `help` for commands");
    driver::run(&mut console, socket_events, input_rx, config.probe_interval).await;

    Ok(())
}
