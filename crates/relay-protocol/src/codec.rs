//! Line encoding and decoding
//!
//! Pure functions: no state is kept between calls and nothing borrowed from
//! the input outlives the call.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::event::{Event, UnknownEvent};
use crate::request::Request;
use crate::LINE_TERMINATOR;

/// Encode a request as one JSON object followed by exactly one `\n`
pub fn encode(request: &Request) -> Result<Vec<u8>, ProtocolError> {
    let mut line = serde_json::to_vec(request).map_err(ProtocolError::Encode)?;
    line.push(LINE_TERMINATOR);
    Ok(line)
}

/// Decode one backend line into an event
///
/// `type` and `sessionId` are required for every line. A known `type` with a
/// malformed payload is an error; an unknown `type` is returned as
/// [`Event::Unknown`] with a copy of the raw line.
pub fn decode(line: &str) -> Result<Event, ProtocolError> {
    let line = trim_terminator(line);
    let value: Value = serde_json::from_str(line).map_err(ProtocolError::Json)?;
    let obj = value.as_object().ok_or(ProtocolError::NotAnObject)?;

    let event_type = required_str(obj, "type")?.to_owned();
    let session_id = required_str(obj, "sessionId")?.to_owned();

    let event = match event_type.as_str() {
        "token" => Event::Token(payload(&event_type, value)?),
        "tool_call" => Event::ToolCall(payload(&event_type, value)?),
        "tool_result" => Event::ToolResult(payload(&event_type, value)?),
        "diff" => Event::Diff(payload(&event_type, value)?),
        "error" => Event::Error(payload(&event_type, value)?),
        "done" => Event::Done(payload(&event_type, value)?),
        _ => Event::Unknown(UnknownEvent {
            session_id,
            event_type,
            raw: line.to_owned(),
        }),
    };

    Ok(event)
}

/// Decode a request line, as the backend side would
pub fn decode_request(line: &str) -> Result<Request, ProtocolError> {
    serde_json::from_str(trim_terminator(line)).map_err(ProtocolError::Json)
}

fn trim_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn required_str<'a>(
    obj: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, ProtocolError> {
    obj.get(field)
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingField(field))
}

fn payload<T: DeserializeOwned>(event_type: &str, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload {
        event_type: event_type.to_owned(),
        source,
    })
}
