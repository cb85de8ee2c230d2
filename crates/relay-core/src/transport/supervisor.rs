//! Backend lifecycle supervision
//!
//! The supervisor owns the backend process exclusively. A watchdog polls
//! liveness on a fixed interval and re-spawns a crashed backend with
//! exponential backoff until the attempt cap is reached.
//!
//! ```text
//! Idle ─▶ Connecting ─▶ Connected ─▶ Degraded ─▶ Reconnecting ─┐
//!                          ▲  │          ▲                      │
//!                          │  │          └──── attempt failed ──┤
//!                          │  │                                 │
//!                          └──┼──────────── attempt succeeded ──┘
//!                             ▼
//!                           Closed  (disconnect, dispose, or attempts exhausted)
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use relay_protocol::Request;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::ReconnectPolicy;
use super::connection::{Channel, Connection};
use super::stream::{read_events, EventStream};
use crate::config::BackendConfig;
use crate::error::{Error, Result};

/// Lifecycle state of the backend connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected
    Idle,
    /// Explicit connect in progress
    Connecting,
    /// Backend running and usable
    Connected,
    /// Backend died; a reconnect attempt is pending
    Degraded,
    /// Waiting out the backoff delay or re-spawning
    Reconnecting,
    /// Disconnected, disposed, or reconnect attempts exhausted
    Closed,
}

/// The only piece of supervisor state shared with read loops
#[derive(Debug, Clone, Copy)]
pub(crate) struct Liveness {
    pub(crate) state: ConnectionState,
    pub(crate) generation: u64,
}

impl Liveness {
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.state == ConnectionState::Connected && self.generation == generation
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Tick {
    Continue,
    Stop,
}

/// Owns the backend process, its watchdog and the reconnect policy
///
/// Cloning is cheap; clones share the same backend.
#[derive(Clone)]
pub struct TransportSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    config: BackendConfig,
    policy: ReconnectPolicy,
    connection: Mutex<Option<Connection>>,
    liveness: watch::Sender<Liveness>,
    reconnect_attempts: AtomicU32,
    generations: AtomicU64,
    watchdog: Mutex<Option<CancellationToken>>,
    /// Serializes connect, reconnect and disconnect
    lifecycle: tokio::sync::Mutex<()>,
}

impl TransportSupervisor {
    pub fn new(config: BackendConfig) -> Self {
        let (liveness, _) = watch::channel(Liveness {
            state: ConnectionState::Idle,
            generation: 0,
        });

        Self {
            inner: Arc::new(Inner {
                policy: ReconnectPolicy::from_config(&config),
                config,
                connection: Mutex::new(None),
                liveness,
                reconnect_attempts: AtomicU32::new(0),
                generations: AtomicU64::new(0),
                watchdog: Mutex::new(None),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.inner.config
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.inner.policy
    }

    /// Spawn the backend and start supervising it
    ///
    /// Spawn failures are returned as-is; there is no implicit retry on an
    /// explicit connect. Connecting while already connected is a no-op.
    pub async fn connect(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        if self.is_connected() {
            debug!("Backend already connected");
            return Ok(());
        }

        self.stop_watchdog();
        let stale = self.inner.connection.lock().take();
        if let Some(stale) = stale {
            debug!("Cleaning up stale backend (generation {})", stale.generation);
            stale.shutdown(self.inner.config.shutdown_timeout()).await;
        }

        self.set_state(ConnectionState::Connecting);
        let token = CancellationToken::new();
        *self.inner.watchdog.lock() = Some(token.clone());

        match self.establish(&token) {
            Ok(generation) => {
                self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
                self.spawn_watchdog(token);
                info!(
                    "Connected to backend '{}' (generation {})",
                    self.inner.config.command, generation
                );
                Ok(())
            }
            Err(e) => {
                token.cancel();
                self.set_state(ConnectionState::Closed);
                error!("Failed to connect to backend: {}", e);
                Err(e)
            }
        }
    }

    /// Stop supervising and shut the backend down
    ///
    /// Waits up to the configured shutdown timeout for the process to exit
    /// and kills it afterwards. Never fails; problems are logged.
    pub async fn disconnect(&self) {
        self.stop_watchdog();
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.set_state(ConnectionState::Closed);

        let connection = self.inner.connection.lock().take();
        if let Some(connection) = connection {
            connection.shutdown(self.inner.config.shutdown_timeout()).await;
            info!("Disconnected from backend");
        }
    }

    /// Synchronous teardown: stop the watchdog and kill the backend without waiting
    pub fn dispose(&self) {
        self.stop_watchdog();
        self.set_state(ConnectionState::Closed);

        let connection = self.inner.connection.lock().take();
        if let Some(connection) = connection {
            connection.abandon();
            debug!("Backend disposed");
        }
    }

    /// True iff connected and the process is confirmed alive
    pub fn is_connected(&self) -> bool {
        let connected = self.inner.liveness.borrow().state == ConnectionState::Connected;
        connected && self.process_alive()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.liveness.borrow().state
    }

    /// Wait until the state satisfies `predicate`, returning that state
    pub async fn wait_for_state(
        &self,
        mut predicate: impl FnMut(ConnectionState) -> bool,
    ) -> ConnectionState {
        let mut liveness = self.inner.liveness.subscribe();
        match liveness.wait_for(|l| predicate(l.state)).await {
            Ok(l) => l.state,
            Err(_) => self.state(),
        }
    }

    /// Current state followed by every later transition
    ///
    /// Transitions closer together than the consumer polls may be
    /// coalesced; the latest state is never skipped.
    pub fn state_changes(&self) -> BoxStream<'static, ConnectionState> {
        let mut liveness = self.inner.liveness.subscribe();
        let current = liveness.borrow_and_update().state;

        stream::unfold(
            (liveness, Some(current), current),
            |(mut liveness, pending, last)| async move {
                if let Some(state) = pending {
                    return Some((state, (liveness, None, last)));
                }
                loop {
                    liveness.changed().await.ok()?;
                    let state = liveness.borrow_and_update().state;
                    if state != last {
                        return Some((state, (liveness, None, state)));
                    }
                }
            },
        )
        .boxed()
    }

    /// Failed reconnect attempts since the last successful connect
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Identifies the current backend instance; bumps on every spawn
    pub fn generation(&self) -> u64 {
        self.inner.liveness.borrow().generation
    }

    pub fn process_id(&self) -> Option<u32> {
        self.inner.connection.lock().as_ref().and_then(Connection::pid)
    }

    /// Force-kill the backend process and leave recovery to the watchdog
    pub fn kill_backend(&self) {
        if let Some(connection) = self.inner.connection.lock().as_mut() {
            warn!("Killing backend (generation {})", connection.generation);
            connection.start_kill();
        }
    }

    /// Encode and write a request line
    pub(crate) async fn send(&self, request: &Request) -> Result<()> {
        let line = relay_protocol::encode(request)?;
        let channel = self.current_channel().ok_or(Error::NotConnected)?;

        if self.inner.config.trace_protocol {
            debug!(target: "relay_core::wire", "-> {}", String::from_utf8_lossy(&line).trim_end());
        }

        channel.write_line(&line).await.map_err(Error::Write)
    }

    /// Write a request and return the stream of its response
    ///
    /// The connection is pinned before writing, so a backend restart in
    /// between ends the stream instead of reading the new process.
    pub(crate) async fn request(
        &self,
        request: &Request,
        session_id: String,
    ) -> Result<EventStream> {
        let (channel, generation) = {
            let slot = self.inner.connection.lock();
            let connection = slot.as_ref().ok_or(Error::NotConnected)?;
            (connection.channel(), connection.generation)
        };

        let line = relay_protocol::encode(request)?;
        if self.inner.config.trace_protocol {
            debug!(target: "relay_core::wire", "-> {}", String::from_utf8_lossy(&line).trim_end());
        }
        channel.write_line(&line).await.map_err(Error::Write)?;

        Ok(read_events(
            channel,
            self.inner.liveness.subscribe(),
            generation,
            session_id,
            self.inner.config.trace_protocol,
        ))
    }

    fn current_channel(&self) -> Option<Arc<Channel>> {
        self.inner.connection.lock().as_ref().map(Connection::channel)
    }

    fn process_alive(&self) -> bool {
        self.inner
            .connection
            .lock()
            .as_mut()
            .is_some_and(Connection::is_alive)
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.liveness.send_if_modified(|liveness| {
            let changed = liveness.state != state;
            liveness.state = state;
            changed
        });
    }

    fn stop_watchdog(&self) {
        if let Some(token) = self.inner.watchdog.lock().take() {
            token.cancel();
        }
    }

    /// Spawn a backend and install it as the current connection
    ///
    /// The install is skipped when `token` was cancelled in the meantime, so
    /// a disconnect racing with a reconnect always wins.
    fn establish(&self, token: &CancellationToken) -> Result<u64> {
        let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let connection = Connection::spawn(&self.inner.config, generation)?;

        let stale = {
            let mut slot = self.inner.connection.lock();
            if token.is_cancelled() {
                drop(slot);
                connection.abandon();
                return Err(Error::Closed);
            }
            let stale = slot.replace(connection);
            self.inner.liveness.send_replace(Liveness {
                state: ConnectionState::Connected,
                generation,
            });
            stale
        };

        if let Some(stale) = stale {
            stale.abandon();
        }

        Ok(generation)
    }

    fn spawn_watchdog(&self, token: CancellationToken) {
        let inner = Arc::downgrade(&self.inner);
        let interval = self.inner.config.watchdog_interval();
        tokio::spawn(run_watchdog(inner, token, interval));
    }

    async fn watchdog_tick(&self, token: &CancellationToken) -> Tick {
        match self.state() {
            ConnectionState::Connected => {
                if self.process_alive() {
                    return Tick::Continue;
                }
                warn!("Backend process died");
                self.inner.liveness.send_if_modified(|liveness| {
                    if liveness.state == ConnectionState::Connected {
                        liveness.state = ConnectionState::Degraded;
                        true
                    } else {
                        false
                    }
                });
                self.attempt_reconnect(token).await
            }
            ConnectionState::Degraded => self.attempt_reconnect(token).await,
            ConnectionState::Closed => Tick::Stop,
            ConnectionState::Idle
            | ConnectionState::Connecting
            | ConnectionState::Reconnecting => Tick::Continue,
        }
    }

    async fn attempt_reconnect(&self, token: &CancellationToken) -> Tick {
        let policy = self.inner.policy;
        if !policy.allows(self.reconnect_attempts()) {
            info!(
                "Max reconnection attempts reached ({}), giving up",
                policy.max_attempts
            );
            self.set_state(ConnectionState::Closed);
            return Tick::Stop;
        }

        let attempt = self.inner.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = policy.delay_for(attempt);
        self.set_state(ConnectionState::Reconnecting);
        debug!("Reconnect attempt {} in {:?}", attempt, delay);

        tokio::select! {
            _ = token.cancelled() => return Tick::Stop,
            _ = tokio::time::sleep(delay) => {}
        }

        let _lifecycle = self.inner.lifecycle.lock().await;
        if token.is_cancelled() {
            return Tick::Stop;
        }

        info!(
            "Attempting reconnection ({}/{})",
            attempt, policy.max_attempts
        );
        match self.establish(token) {
            Ok(generation) => {
                self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
                info!("Reconnected to backend (generation {})", generation);
                Tick::Continue
            }
            Err(e) => {
                warn!(
                    "Reconnection attempt failed, will retry on next watchdog cycle: {}",
                    e
                );
                self.set_state(ConnectionState::Degraded);
                Tick::Continue
            }
        }
    }
}

/// Periodic liveness check
///
/// Holds only a weak reference between ticks so an abandoned supervisor
/// does not keep itself alive. Cancellation is checked between ticks and
/// during backoff, never in the middle of I/O.
async fn run_watchdog(
    inner: Weak<Inner>,
    token: CancellationToken,
    interval: std::time::Duration,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        let supervisor = TransportSupervisor { inner };
        if supervisor.watchdog_tick(&token).await == Tick::Stop {
            break;
        }
    }

    debug!("Watchdog stopped");
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(token) = self.watchdog.get_mut().take() {
            token.cancel();
        }
        if let Some(connection) = self.connection.get_mut().take() {
            connection.abandon();
        }
    }
}
