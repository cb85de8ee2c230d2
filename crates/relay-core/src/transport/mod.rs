//! Transport - backend process supervision over stdio
//!
//! - `TransportSupervisor`: owns the process, watchdog and reconnect policy
//! - `ReconnectPolicy`: exponential backoff with an attempt cap
//! - `EventStream`: lazy per-request stream of decoded events
//!
//! Requests are written to the backend's stdin and events read from its
//! stdout, one JSON object per line. Stderr is logged and otherwise ignored.

mod backoff;
mod connection;
mod process;
mod stream;
mod supervisor;

pub use backoff::ReconnectPolicy;
pub use stream::EventStream;
pub use supervisor::{ConnectionState, TransportSupervisor};
