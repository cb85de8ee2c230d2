//! A single spawned backend and its I/O handles

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::process::backend_command;
use crate::config::BackendConfig;
use crate::error::{Error, Result};

pub(crate) type LineReader = Lines<BufReader<ChildStdout>>;

/// Pipe handles shared between the supervisor and in-flight read loops
pub(crate) struct Channel {
    writer: Mutex<Option<ChildStdin>>,
    reader: Arc<Mutex<LineReader>>,
    /// Responses whose streams were dropped before `done`
    discarded: AtomicUsize,
}

impl Channel {
    /// Write one already-terminated line and flush it
    pub(crate) async fn write_line(&self, line: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        let stdin = writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "Backend input closed"))?;

        stdin.write_all(line).await?;
        stdin.flush().await
    }

    pub(crate) fn reader(&self) -> Arc<Mutex<LineReader>> {
        Arc::clone(&self.reader)
    }

    /// Record responses nobody will read; the next reader discards them
    pub(crate) fn discard_responses(&self, count: usize) {
        self.discarded.fetch_add(count, Ordering::SeqCst);
    }

    /// Claim the abandoned responses queued ahead of the caller's own
    pub(crate) fn take_discarded(&self) -> usize {
        self.discarded.swap(0, Ordering::SeqCst)
    }
}

/// Owned by the supervisor; never handed out
pub(crate) struct Connection {
    pub(crate) generation: u64,
    child: Child,
    channel: Arc<Channel>,
    diagnostics: JoinHandle<()>,
}

impl Connection {
    pub(crate) fn spawn(config: &BackendConfig, generation: u64) -> Result<Self> {
        let mut child = backend_command(config)
            .spawn()
            .map_err(|source| Error::Spawn {
                command: config.command.clone(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("Failed to open backend stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("Failed to open backend stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("Failed to open backend stderr"))?;

        debug!(
            "Spawned backend '{}' (pid {:?}, generation {})",
            config.command,
            child.id(),
            generation
        );

        let diagnostics = tokio::spawn(log_diagnostics(stderr, generation));

        Ok(Self {
            generation,
            child,
            channel: Arc::new(Channel {
                writer: Mutex::new(Some(stdin)),
                reader: Arc::new(Mutex::new(BufReader::new(stdout).lines())),
                discarded: AtomicUsize::new(0),
            }),
            diagnostics,
        })
    }

    pub(crate) fn channel(&self) -> Arc<Channel> {
        Arc::clone(&self.channel)
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Non-blocking liveness probe; any error counts as dead
    pub(crate) fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub(crate) fn start_kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!("Failed to kill backend (generation {}): {}", self.generation, e);
        }
    }

    /// Tear down without waiting
    pub(crate) fn abandon(mut self) {
        self.start_kill();
        self.diagnostics.abort();
    }

    /// Close output, then input, then wait for the process up to `timeout`
    /// before killing it. Failures are logged, never returned.
    pub(crate) async fn shutdown(mut self, timeout: Duration) {
        match tokio::time::timeout(timeout, self.channel.writer.lock()).await {
            Ok(mut writer) => {
                if let Some(mut stdin) = writer.take()
                    && let Err(e) = stdin.shutdown().await
                {
                    warn!("Error closing backend input: {}", e);
                }
            }
            Err(_) => warn!("Timed out waiting for an in-flight write during disconnect"),
        }

        // In-flight read loops keep their own handle until they observe
        // the disconnect.
        drop(self.channel);

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => debug!("Backend exited with {}", status),
            Ok(Err(e)) => warn!("Error waiting for backend exit: {}", e),
            Err(_) => {
                warn!("Backend did not exit within {:?}, killing it", timeout);
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to kill backend: {}", e);
                }
            }
        }

        self.diagnostics.abort();
    }
}

/// Drain the backend's stderr into the log; never parsed as protocol
async fn log_diagnostics(stderr: ChildStderr, generation: u64) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "relay_core::backend", generation, "{}", line),
            Ok(None) => break,
            Err(e) => {
                debug!(target: "relay_core::backend", "Error reading backend stderr: {}", e);
                break;
            }
        }
    }
}
