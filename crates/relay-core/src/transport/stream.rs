//! Per-request read loop
//!
//! Turns backend output lines into a lazy stream of events for one request.
//! The stream ends after `done`, after a read or decode failure, or once the
//! connection it reads from is no longer the live one. The last two cases
//! yield one synthesized error event first.
//!
//! A stream dropped before its `done` leaves the rest of its response in the
//! pipe. The next stream to take the reader discards that response before
//! reading its own.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use relay_protocol::{decode, Event};
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::{debug, error, warn};

use super::connection::{Channel, LineReader};
use super::supervisor::Liveness;

/// Events for a single request, in the order the backend emitted them
pub type EventStream = BoxStream<'static, Event>;

enum Step {
    Next(Event),
    Last(Event),
}

struct ReadLoop {
    channel: Arc<Channel>,
    guard: Option<OwnedMutexGuard<LineReader>>,
    /// Abandoned responses still to discard before this one starts
    stale: usize,
    liveness: watch::Receiver<Liveness>,
    generation: u64,
    session_id: String,
    trace: bool,
    finished: bool,
}

pub(crate) fn read_events(
    channel: Arc<Channel>,
    liveness: watch::Receiver<Liveness>,
    generation: u64,
    session_id: String,
    trace: bool,
) -> EventStream {
    let read_loop = ReadLoop {
        channel,
        guard: None,
        stale: 0,
        liveness,
        generation,
        session_id,
        trace,
        finished: false,
    };

    stream::unfold(read_loop, |mut read_loop| async move {
        let event = read_loop.next_event().await?;
        Some((event, read_loop))
    })
    .boxed()
}

impl ReadLoop {
    async fn next_event(&mut self) -> Option<Event> {
        if self.finished {
            return None;
        }

        match self.step().await {
            Step::Next(event) => Some(event),
            Step::Last(event) => {
                self.finished = true;
                // Release the reader so the next request can use it
                self.guard = None;
                Some(event)
            }
        }
    }

    async fn step(&mut self) -> Step {
        let held = match self.guard.take() {
            Some(guard) => guard,
            None => {
                let reader: Arc<Mutex<LineReader>> = self.channel.reader();
                let guard = tokio::select! {
                    guard = reader.lock_owned() => guard,
                    _ = connection_lost(&mut self.liveness, self.generation) => {
                        return lost(&self.session_id);
                    }
                };
                self.stale = self.channel.take_discarded();
                if self.stale > 0 {
                    debug!(
                        "Discarding {} abandoned response(s) before session {}",
                        self.stale, self.session_id
                    );
                }
                guard
            }
        };

        // The guard stays in `self` while reading so a drop mid-read is seen
        let Self {
            guard,
            stale,
            liveness,
            generation,
            session_id,
            trace,
            ..
        } = self;
        let guard = guard.insert(held);
        let generation = *generation;

        loop {
            if !liveness.borrow().is_current(generation) {
                return lost(session_id);
            }

            tokio::select! {
                biased;
                line = guard.next_line() => match line {
                    Ok(Some(line)) => {
                        if *trace {
                            debug!(target: "relay_core::wire", "<- {}", line);
                        }
                        if line.trim().is_empty() {
                            continue;
                        }
                        if *stale > 0 {
                            if matches!(decode(&line), Ok(event) if event.is_done()) {
                                *stale -= 1;
                            }
                            continue;
                        }
                        return match decode(&line) {
                            Ok(event) if event.is_done() => Step::Last(event),
                            Ok(event) => Step::Next(event),
                            Err(e) => {
                                warn!("Failed to decode backend line: {}", e);
                                Step::Last(Event::error(
                                    session_id.as_str(),
                                    format!("Protocol error: {}", e),
                                ))
                            }
                        };
                    }
                    Ok(None) => {
                        warn!("Backend closed connection unexpectedly");
                        return Step::Last(Event::error(
                            session_id.as_str(),
                            "Backend connection closed",
                        ));
                    }
                    Err(e) => {
                        error!("Error reading from backend: {}", e);
                        return Step::Last(Event::error(
                            session_id.as_str(),
                            format!("Backend communication error: {}", e),
                        ));
                    }
                },
                _ = connection_lost(liveness, generation) => {
                    return lost(session_id);
                }
            }
        }
    }
}

impl Drop for ReadLoop {
    fn drop(&mut self) {
        if !self.finished {
            // Runs before the guard field drops, so the next reader sees it
            self.channel.discard_responses(self.stale + 1);
        }
    }
}

fn lost(session_id: &str) -> Step {
    warn!("Backend connection lost during request for session {}", session_id);
    Step::Last(Event::error(session_id, "Backend disconnected"))
}

/// Resolves once `generation` stops being the connected one
async fn connection_lost(liveness: &mut watch::Receiver<Liveness>, generation: u64) {
    let _ = liveness
        .wait_for(|liveness| !liveness.is_current(generation))
        .await;
}
