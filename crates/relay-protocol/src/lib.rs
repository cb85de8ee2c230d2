//! Relay Protocol - JSON Lines wire format shared by the editor and the backend
//!
//! Every message is a single JSON object terminated by `\n`. Requests flow
//! from the editor to the backend, events flow back. This crate only
//! converts between values and lines; it performs no I/O.

pub mod codec;
pub mod context;
pub mod error;
pub mod event;
pub mod request;

pub use codec::{decode, decode_request, encode};
pub use context::ContextItem;
pub use error::ProtocolError;
pub use event::{
    DiffEvent, DiffOperation, DoneEvent, ErrorEvent, Event, FileChange, TokenEvent,
    ToolCallEvent, ToolResultEvent, UnknownEvent,
};
pub use request::{CancelRequest, Request, SendMessageRequest};

/// Line terminator appended to every encoded request
pub const LINE_TERMINATOR: u8 = b'\n';
