//! Cooperative event loop for the console.
//!
//! One task owns the [`Console`] and multiplexes three sources with
//! `tokio::select!`: socket callbacks, input lines, and the liveness-probe
//! timer. Handlers run to completion one at a time, so no state is ever
//! shared across tasks.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::client::console::{Console, Flow};
use crate::client::sink::OutputSink;
use crate::client::transport::{SocketEventReceiver, SocketFactory};
use crate::storage::PreferenceStore;

/// Runs the console until `quit` or until the input channel closes.
///
/// The probe interval exists only while the session is connected or
/// running; it is dropped on the same loop iteration the session leaves
/// those states.
pub async fn run<F, S, P>(
    console: &mut Console<F, S, P>,
    mut socket_events: SocketEventReceiver,
    mut input: mpsc::Receiver<String>,
    probe_period: Duration,
) where
    F: SocketFactory,
    S: OutputSink,
    P: PreferenceStore,
{
    let mut probe: Option<Interval> = None;

    loop {
        sync_probe(&mut probe, console.probe_active(), probe_period);

        tokio::select! {
            Some((id, event)) = socket_events.recv() => {
                console.handle_socket_event(id, event);
            }
            line = input.recv() => {
                let Some(line) = line else {
                    tracing::debug!("input closed");
                    break;
                };
                if console.handle_line(&line) == Flow::Quit {
                    break;
                }
            }
            () = next_tick(&mut probe) => {
                console.probe_tick();
            }
        }
    }

    console.shutdown();
    tracing::info!("console stopped");
}

/// Starts or cancels the probe timer to match the session state.
fn sync_probe(probe: &mut Option<Interval>, active: bool, period: Duration) {
    match (active, probe.is_some()) {
        (true, false) => {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            *probe = Some(interval);
            tracing::debug!(period_ms = period.as_millis(), "liveness probe started");
        }
        (false, true) => {
            *probe = None;
            tracing::debug!("liveness probe stopped");
        }
        _ => {}
    }
}

async fn next_tick(probe: &mut Option<Interval>) {
    match probe {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
