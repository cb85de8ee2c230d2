//! Relay Core - bridge between an editor and a streaming assistant backend
//!
//! This crate provides:
//! - Supervision of the backend process (watchdog, reconnect with backoff)
//! - A session client that turns requests into lazy event streams
//! - An event dispatcher that fans events out to listeners on one thread
//! - TOML configuration

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod transport;

pub use client::{BackendClient, SessionClient};
pub use config::{BackendConfig, Config, ConfigManager, GeneralConfig};
pub use dispatch::{EventDispatcher, EventListener, ListenerId, DISPATCH_THREAD_NAME};
pub use error::{Error, Result};
pub use transport::{ConnectionState, EventStream, ReconnectPolicy, TransportSupervisor};

// The wire types are part of this crate's API
pub use relay_protocol::{
    CancelRequest, ContextItem, DiffEvent, DiffOperation, DoneEvent, ErrorEvent, Event,
    FileChange, Request, SendMessageRequest, TokenEvent, ToolCallEvent, ToolResultEvent,
    UnknownEvent,
};
