//! Event dispatch - ordered fan-out of backend events to listeners
//!
//! All callbacks run on one dedicated thread, in publish order, and in
//! registration order within a single event. Each publish captures the
//! listener set at that moment, so subscribing or unsubscribing never
//! affects an event already in flight.

mod registry;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use relay_protocol::{
    DiffEvent, DoneEvent, ErrorEvent, Event, TokenEvent, ToolCallEvent, ToolResultEvent,
    UnknownEvent,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::Result;

pub use registry::ListenerId;
use registry::{Registry, Snapshot};

/// Name of the thread every listener callback runs on
pub const DISPATCH_THREAD_NAME: &str = "relay-dispatch";

/// Receives backend events. Every callback defaults to a no-op.
pub trait EventListener: Send + Sync {
    fn on_token(&self, _event: &TokenEvent) {}
    fn on_tool_call(&self, _event: &ToolCallEvent) {}
    fn on_tool_result(&self, _event: &ToolResultEvent) {}
    fn on_diff(&self, _event: &DiffEvent) {}
    fn on_error(&self, _event: &ErrorEvent) {}
    fn on_done(&self, _event: &DoneEvent) {}
    fn on_unknown(&self, _event: &UnknownEvent) {}
}

enum Job {
    Deliver { event: Event, listeners: Snapshot },
    Flush(oneshot::Sender<()>),
}

struct Shared {
    registry: Mutex<Registry>,
    queue: mpsc::UnboundedSender<Job>,
    scope: CancellationToken,
}

/// Cheap to clone; all clones share the same listeners and worker thread
#[derive(Clone)]
pub struct EventDispatcher {
    shared: Arc<Shared>,
}

impl EventDispatcher {
    /// Start a dispatcher with its own worker thread. The thread exits once
    /// the last clone is dropped.
    pub fn new() -> Result<Self> {
        let (queue, jobs) = mpsc::unbounded_channel();
        let scope = CancellationToken::new();

        let worker_scope = scope.clone();
        thread::Builder::new()
            .name(DISPATCH_THREAD_NAME.to_string())
            .spawn(move || run_worker(jobs, worker_scope))?;

        Ok(Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                queue,
                scope,
            }),
        })
    }

    /// Register a listener. After `dispose` it will never be called.
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        self.shared.registry.lock().insert(listener)
    }

    /// Returns false if the id was not registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.registry.lock().remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// Queue an event for delivery. Never blocks and never runs a callback
    /// on the caller's thread.
    pub fn publish(&self, event: Event) {
        if self.shared.scope.is_cancelled() {
            return;
        }

        let listeners = self.shared.registry.lock().snapshot();
        if listeners.is_empty() {
            return;
        }

        if self
            .shared
            .queue
            .send(Job::Deliver { event, listeners })
            .is_err()
        {
            debug!("Dispatch worker has stopped, dropping event");
        }
    }

    /// Resolves once every event published before this call was delivered
    /// (or dropped by `dispose`).
    pub async fn flush(&self) {
        let (done, delivered) = oneshot::channel();
        if self.shared.queue.send(Job::Flush(done)).is_ok() {
            let _ = delivered.await;
        }
    }

    /// Drop all listeners and every queued event. Idempotent.
    pub fn dispose(&self) {
        if self.shared.scope.is_cancelled() {
            return;
        }
        self.shared.scope.cancel();
        self.shared.registry.lock().clear();
        debug!("Event dispatcher disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.scope.is_cancelled()
    }
}

fn run_worker(mut jobs: mpsc::UnboundedReceiver<Job>, scope: CancellationToken) {
    while let Some(job) = jobs.blocking_recv() {
        match job {
            Job::Deliver { event, listeners } => {
                if scope.is_cancelled() {
                    continue;
                }
                for listener in listeners.iter() {
                    if scope.is_cancelled() {
                        break;
                    }
                    deliver(listener.as_ref(), &event);
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Dispatch worker exiting");
}

fn deliver(listener: &dyn EventListener, event: &Event) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match event {
        Event::Token(e) => listener.on_token(e),
        Event::ToolCall(e) => listener.on_tool_call(e),
        Event::ToolResult(e) => listener.on_tool_result(e),
        Event::Diff(e) => listener.on_diff(e),
        Event::Error(e) => listener.on_error(e),
        Event::Done(e) => listener.on_done(e),
        Event::Unknown(e) => listener.on_unknown(e),
    }));

    if outcome.is_err() {
        error!("Event listener panicked while handling '{}'", event.kind());
    }
}
