//! Child process supervision for `run` requests.
//!
//! A [`RunningCommand`] is the connection's handle on one child. Output is
//! pumped by background tasks into the connection's [`ProcessEvent`]
//! channel; the supervisor task reports [`ProcessEvent::Exited`] only after
//! both pumps have drained, so the completion status never overtakes the
//! last output fragment.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::RelayError;
use crate::protocol::{OutputChunk, OutputStream, RunArgs};

/// Environment variable carrying the recording JSON into the child.
pub const RECORDING_ENV: &str = "RELAY_RECORDING";

const READ_BUFFER: usize = 4096;

/// Shell used to interpret command lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    /// Program, e.g. `sh`.
    pub program: String,
    /// Flag preceding the command line, e.g. `-c`.
    pub flag: String,
}

/// Notification from a running child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// One output fragment.
    Output(OutputChunk),
    /// The child exited (or was killed). `code` is `None` when it died
    /// from a signal.
    Exited {
        /// Exit code, if any.
        code: Option<i32>,
    },
}

/// Handle on one running child process.
#[derive(Debug)]
pub struct RunningCommand {
    pid: Option<u32>,
    stdin: Option<mpsc::UnboundedSender<String>>,
    kill: Option<oneshot::Sender<()>>,
}

impl RunningCommand {
    /// Spawns `args.command_line` under `shell`.
    ///
    /// The child is killed when the returned handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] if the process cannot be spawned.
    pub fn spawn(
        shell: &Shell,
        args: &RunArgs,
        events: mpsc::UnboundedSender<ProcessEvent>,
    ) -> Result<Self, RelayError> {
        let mut command = tokio::process::Command::new(&shell.program);
        command
            .arg(&shell.flag)
            .arg(&args.command_line)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(recording) = &args.recording {
            command.env(RECORDING_ENV, recording.to_string());
        }

        let mut child = command.spawn()?;
        let pid = child.id();
        let stdin = child.stdin.take().map(|pipe| {
            let (lines, lines_rx) = mpsc::unbounded_channel();
            tokio::spawn(feed_stdin(pipe, lines_rx));
            lines
        });
        let pumps = [
            child
                .stdout
                .take()
                .map(|out| tokio::spawn(pump(out, OutputStream::Stdout, events.clone()))),
            child
                .stderr
                .take()
                .map(|err| tokio::spawn(pump(err, OutputStream::Stderr, events.clone()))),
        ];

        let (kill, kill_rx) = oneshot::channel();
        tokio::spawn(supervise(child, kill_rx, pumps, events));
        tracing::info!(pid, command_line = %args.command_line, "command started");

        Ok(Self {
            pid,
            stdin,
            kill: Some(kill),
        })
    }

    /// OS process id, if still known.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Requests termination. [`ProcessEvent::Exited`] follows.
    pub fn kill(&mut self) {
        if let Some(kill) = self.kill.take() {
            tracing::info!(pid = self.pid, "stopping command");
            let _ = kill.send(());
        }
    }

    /// Queues `line` plus a newline for the child's stdin.
    ///
    /// Never waits on the pipe: a child that does not read its input
    /// cannot stall the caller.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] if stdin is closed.
    pub fn write_line(&self, line: &str) -> Result<(), RelayError> {
        let closed = || {
            RelayError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stdin is closed",
            ))
        };
        let stdin = self.stdin.as_ref().ok_or_else(closed)?;
        stdin.send(format!("{line}\n")).map_err(|_| closed())
    }
}

/// Writes queued lines to the child's stdin until the pipe breaks or the
/// handle is dropped.
async fn feed_stdin(mut pipe: ChildStdin, mut lines: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = lines.recv().await {
        let written = match pipe.write_all(line.as_bytes()).await {
            Ok(()) => pipe.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::debug!(error = %e, "stdin writer stopped");
            break;
        }
    }
}

/// Forwards raw output fragments until EOF.
async fn pump<R>(mut reader: R, stream: OutputStream, events: mpsc::UnboundedSender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0_u8; READ_BUFFER];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let bytes = buf.get(..n).unwrap_or_default();
                let chunk = OutputChunk {
                    stream,
                    data: String::from_utf8_lossy(bytes).into_owned(),
                };
                if events.send(ProcessEvent::Output(chunk)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(%stream, error = %e, "output pump stopped");
                break;
            }
        }
    }
}

/// Waits for exit or a kill request, drains the pumps, then reports.
async fn supervise(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    pumps: [Option<JoinHandle<()>>; 2],
    events: mpsc::UnboundedSender<ProcessEvent>,
) {
    // A dropped handle also resolves `kill_rx`, which kills the child.
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill_rx => None,
    };
    let killed = exited.is_none();
    let status = match exited {
        Some(status) => status,
        None => {
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "kill failed, child already gone");
            }
            child.wait().await
        }
    };

    // Grandchildren may hold the pipes open after a kill; don't wait on them.
    for pump in pumps.into_iter().flatten() {
        if killed {
            pump.abort();
        } else {
            let _ = pump.await;
        }
    }

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to reap command");
            None
        }
    };
    tracing::info!(?code, "command exited");
    let _ = events.send(ProcessEvent::Exited { code });
}
