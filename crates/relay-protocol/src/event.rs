//! Events streamed from the backend
//!
//! One event is produced per received line. Known `type` values map to a
//! dedicated variant; anything else becomes [`Event::Unknown`] so older
//! editors keep working against newer backends.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Streamed text fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEvent {
    pub session_id: String,
    pub text: String,
}

/// The backend started running a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallEvent {
    pub session_id: String,
    pub tool: String,
    pub input: Map<String, Value>,
}

/// A tool finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultEvent {
    pub session_id: String,
    pub tool: String,
    pub output: Map<String, Value>,
}

/// Proposed file edits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEvent {
    pub session_id: String,
    #[serde(default)]
    pub files: Vec<FileChange>,
}

/// Full before/after content of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub after: String,
}

/// What a [`FileChange`] does to the file on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOperation {
    Create,
    Modify,
    Delete,
}

impl FileChange {
    pub fn operation(&self) -> DiffOperation {
        match (self.before.is_empty(), self.after.is_empty()) {
            (true, false) => DiffOperation::Create,
            (false, true) => DiffOperation::Delete,
            _ => DiffOperation::Modify,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub session_id: String,
    pub message: String,
}

/// Last event of a successful stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoneEvent {
    pub session_id: String,
}

/// An event type this build does not know about
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownEvent {
    pub session_id: String,
    pub event_type: String,
    /// The line exactly as received
    pub raw: String,
}

/// A decoded backend event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Token(TokenEvent),
    ToolCall(ToolCallEvent),
    ToolResult(ToolResultEvent),
    Diff(DiffEvent),
    Error(ErrorEvent),
    Done(DoneEvent),
    Unknown(UnknownEvent),
}

impl Event {
    /// Build an error event, used for failures synthesized on the editor side
    pub fn error(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Error(ErrorEvent {
            session_id: session_id.into(),
            message: message.into(),
        })
    }

    pub fn done(session_id: impl Into<String>) -> Self {
        Event::Done(DoneEvent {
            session_id: session_id.into(),
        })
    }

    pub fn session_id(&self) -> &str {
        match self {
            Event::Token(e) => &e.session_id,
            Event::ToolCall(e) => &e.session_id,
            Event::ToolResult(e) => &e.session_id,
            Event::Diff(e) => &e.session_id,
            Event::Error(e) => &e.session_id,
            Event::Done(e) => &e.session_id,
            Event::Unknown(e) => &e.session_id,
        }
    }

    /// The wire `type` value this event was decoded from
    pub fn kind(&self) -> &str {
        match self {
            Event::Token(_) => "token",
            Event::ToolCall(_) => "tool_call",
            Event::ToolResult(_) => "tool_result",
            Event::Diff(_) => "diff",
            Event::Error(_) => "error",
            Event::Done(_) => "done",
            Event::Unknown(e) => &e.event_type,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Event::Done(_))
    }
}
