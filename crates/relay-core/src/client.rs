//! Session client - the editor-facing surface of the bridge
//!
//! Wraps a `TransportSupervisor` with request/response semantics: a message
//! goes out as one line and comes back as a lazy stream of events for that
//! session. Optionally forwards streams to an `EventDispatcher`.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use relay_protocol::{CancelRequest, Event, Request, SendMessageRequest};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::dispatch::EventDispatcher;
use crate::error::{Error, Result};
use crate::transport::{ConnectionState, EventStream, TransportSupervisor};

/// Operations collaborators depend on, independent of the transport
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self);

    /// Send a message and stream back its events until `done`
    async fn send_message(&self, request: SendMessageRequest) -> Result<EventStream>;

    /// Ask the backend to stop work for a session. Never fails.
    async fn cancel(&self, session_id: &str);

    fn is_connected(&self) -> bool;
}

pub struct SessionClient {
    supervisor: TransportSupervisor,
    dispatcher: Option<EventDispatcher>,
    /// Parent of every running pump; replaced on disconnect
    pumps: Mutex<CancellationToken>,
}

impl SessionClient {
    pub fn new(config: BackendConfig) -> Self {
        Self::from_supervisor(TransportSupervisor::new(config), None)
    }

    /// Client whose `dispatch` calls publish to `dispatcher`
    pub fn with_dispatcher(config: BackendConfig, dispatcher: EventDispatcher) -> Self {
        Self::from_supervisor(TransportSupervisor::new(config), Some(dispatcher))
    }

    pub fn from_supervisor(
        supervisor: TransportSupervisor,
        dispatcher: Option<EventDispatcher>,
    ) -> Self {
        Self {
            supervisor,
            dispatcher,
            pumps: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn supervisor(&self) -> &TransportSupervisor {
        &self.supervisor
    }

    pub fn dispatcher(&self) -> Option<&EventDispatcher> {
        self.dispatcher.as_ref()
    }

    pub async fn connect(&self) -> Result<()> {
        self.supervisor.connect().await
    }

    /// Stop event pumps, then shut the backend down
    pub async fn disconnect(&self) {
        self.stop_pumps();
        self.supervisor.disconnect().await;
    }

    /// Synchronous variant of `disconnect` for drop paths
    pub fn dispose(&self) {
        self.stop_pumps();
        self.supervisor.dispose();
    }

    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Send a message and return the events it produces
    ///
    /// The stream yields each event as the backend emits it and ends after
    /// `done`. A decode failure, a read failure or a lost backend ends it
    /// with a single error event instead. Only one stream per session may
    /// be in flight at a time. Dropping a stream early is allowed; the rest
    /// of its response is discarded before the next request reads.
    pub async fn send_message(&self, request: SendMessageRequest) -> Result<EventStream> {
        if !self.supervisor.is_connected() {
            return Err(Error::NotConnected);
        }

        debug!(
            "Sending message {} for session {}",
            request.id, request.session_id
        );
        let session_id = request.session_id.clone();
        self.supervisor
            .request(&Request::SendMessage(request), session_id)
            .await
    }

    /// Fire-and-forget cancel; a no-op while disconnected
    pub async fn cancel(&self, session_id: &str) {
        if !self.supervisor.is_connected() {
            debug!("Not connected, ignoring cancel for session {}", session_id);
            return;
        }

        let request = Request::Cancel(CancelRequest::new(session_id));
        if let Err(e) = self.supervisor.send(&request).await {
            warn!("Failed to send cancel for session {}: {}", session_id, e);
        }
    }

    /// Send a message and publish its events to the attached dispatcher
    ///
    /// The returned handle completes when the stream ends or the client
    /// disconnects. Either way listeners see a terminal event: the stream's
    /// own `done` or error, or a "Backend disconnected" error on disconnect.
    pub async fn dispatch(&self, request: SendMessageRequest) -> Result<JoinHandle<()>> {
        let dispatcher = self.dispatcher.clone().ok_or(Error::NoDispatcher)?;
        let session_id = request.session_id.clone();
        let events = self.send_message(request).await?;
        let token = self.pumps.lock().child_token();

        Ok(tokio::spawn(pump(events, dispatcher, token, session_id)))
    }

    fn stop_pumps(&self) {
        let token = std::mem::take(&mut *self.pumps.lock());
        token.cancel();
    }
}

async fn pump(
    mut events: EventStream,
    dispatcher: EventDispatcher,
    token: CancellationToken,
    session_id: String,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Event pump for session {} stopped", session_id);
                dispatcher.publish(Event::error(session_id.as_str(), "Backend disconnected"));
                break;
            }
            event = events.next() => match event {
                Some(event) => dispatcher.publish(event),
                None => break,
            }
        }
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        self.pumps.get_mut().cancel();
    }
}

#[async_trait]
impl BackendClient for SessionClient {
    async fn connect(&self) -> Result<()> {
        SessionClient::connect(self).await
    }

    async fn disconnect(&self) {
        SessionClient::disconnect(self).await
    }

    async fn send_message(&self, request: SendMessageRequest) -> Result<EventStream> {
        SessionClient::send_message(self, request).await
    }

    async fn cancel(&self, session_id: &str) {
        SessionClient::cancel(self, session_id).await
    }

    fn is_connected(&self) -> bool {
        SessionClient::is_connected(self)
    }
}
