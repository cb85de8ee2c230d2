//! Requests sent from the editor to the backend

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ContextItem;
use crate::error::ProtocolError;

/// A request line, discriminated by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "sendMessage")]
    SendMessage(SendMessageRequest),
    #[serde(rename = "cancel")]
    Cancel(CancelRequest),
}

impl Request {
    pub fn id(&self) -> &str {
        match self {
            Request::SendMessage(r) => &r.id,
            Request::Cancel(r) => &r.id,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Request::SendMessage(r) => &r.session_id,
            Request::Cancel(r) => &r.session_id,
        }
    }

    /// Wire discriminator of this request
    pub fn kind(&self) -> &'static str {
        match self {
            Request::SendMessage(_) => "sendMessage",
            Request::Cancel(_) => "cancel",
        }
    }
}

impl From<SendMessageRequest> for Request {
    fn from(request: SendMessageRequest) -> Self {
        Request::SendMessage(request)
    }
}

impl From<CancelRequest> for Request {
    fn from(request: CancelRequest) -> Self {
        Request::Cancel(request)
    }
}

/// User message plus the editor context attached to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub id: String,
    pub session_id: String,
    pub text: String,
    /// Opaque to the protocol; order is preserved on the wire
    #[serde(default)]
    pub context: Vec<Value>,
}

impl SendMessageRequest {
    /// Create a request with a fresh id and no context
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            text: text.into(),
            context: Vec::new(),
        }
    }

    /// Override the generated id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Append a typed context item
    pub fn with_context(mut self, item: ContextItem) -> Result<Self, ProtocolError> {
        self.context.push(item.to_value()?);
        Ok(self)
    }

    /// Append a raw context object
    pub fn with_raw_context(mut self, value: Value) -> Self {
        self.context.push(value);
        self
    }
}

/// Ask the backend to stop streaming for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub id: String,
    pub session_id: String,
}

impl CancelRequest {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
        }
    }
}
