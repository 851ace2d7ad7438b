//! JSON hub protocol, version 1.
//!
//! Every message is a JSON document followed by [`RECORD_SEPARATOR`]. A single
//! websocket frame may carry several of them.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::error::TransportError;

pub const RECORD_SEPARATOR: char = '\u{1e}';
pub const PROTOCOL_NAME: &str = "json";
pub const PROTOCOL_VERSION: u32 = 1;

const INVOCATION: u8 = 1;
const STREAM_ITEM: u8 = 2;
const COMPLETION: u8 = 3;
const STREAM_INVOCATION: u8 = 4;
const CANCEL_INVOCATION: u8 = 5;
const PING: u8 = 6;
const CLOSE: u8 = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    StreamItem {
        invocation_id: String,
        item: Value,
    },
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    StreamInvocation {
        invocation_id: String,
        target: String,
        arguments: Vec<Value>,
    },
    CancelInvocation {
        invocation_id: String,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: u8,
    invocation_id: Option<String>,
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    item: Option<Value>,
    result: Option<Value>,
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: bool,
}

impl RawMessage {
    fn into_message(self) -> Result<Option<HubMessage>, TransportError> {
        let message = match self.kind {
            INVOCATION => HubMessage::Invocation {
                invocation_id: self.invocation_id,
                target: required(self.target, "target")?,
                arguments: self.arguments,
            },
            STREAM_ITEM => HubMessage::StreamItem {
                invocation_id: required(self.invocation_id, "invocationId")?,
                item: self.item.unwrap_or(Value::Null),
            },
            COMPLETION => HubMessage::Completion {
                invocation_id: required(self.invocation_id, "invocationId")?,
                result: self.result,
                error: self.error,
            },
            STREAM_INVOCATION => HubMessage::StreamInvocation {
                invocation_id: required(self.invocation_id, "invocationId")?,
                target: required(self.target, "target")?,
                arguments: self.arguments,
            },
            CANCEL_INVOCATION => HubMessage::CancelInvocation {
                invocation_id: required(self.invocation_id, "invocationId")?,
            },
            PING => HubMessage::Ping,
            CLOSE => HubMessage::Close {
                error: self.error,
                allow_reconnect: self.allow_reconnect,
            },
            other => {
                log::debug!("Ignoring hub message with unknown type {other}");
                return Ok(None);
            }
        };
        Ok(Some(message))
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, TransportError> {
    value.ok_or_else(|| TransportError::Protocol(format!("message is missing `{field}`")))
}

/// Splits a frame into its records. A trailing empty segment is not a record.
pub fn records(frame: &str) -> impl Iterator<Item = &str> {
    frame
        .split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
}

/// Parses one record. `Ok(None)` for message types this client does not know.
pub fn parse_record(record: &str) -> Result<Option<HubMessage>, TransportError> {
    let raw: RawMessage = serde_json::from_str(record)?;
    raw.into_message()
}

/// Parses every record of a frame, failing on the first malformed one.
pub fn parse_messages(frame: &str) -> Result<Vec<HubMessage>, TransportError> {
    let mut messages = Vec::new();
    for record in records(frame) {
        if let Some(message) = parse_record(record)? {
            messages.push(message);
        }
    }
    Ok(messages)
}

pub fn encode(message: &HubMessage) -> String {
    let mut body = Map::new();
    match message {
        HubMessage::Invocation {
            invocation_id,
            target,
            arguments,
        } => {
            body.insert("type".into(), json!(INVOCATION));
            if let Some(id) = invocation_id {
                body.insert("invocationId".into(), json!(id));
            }
            body.insert("target".into(), json!(target));
            body.insert("arguments".into(), Value::Array(arguments.clone()));
        }
        HubMessage::StreamItem {
            invocation_id,
            item,
        } => {
            body.insert("type".into(), json!(STREAM_ITEM));
            body.insert("invocationId".into(), json!(invocation_id));
            body.insert("item".into(), item.clone());
        }
        HubMessage::Completion {
            invocation_id,
            result,
            error,
        } => {
            body.insert("type".into(), json!(COMPLETION));
            body.insert("invocationId".into(), json!(invocation_id));
            if let Some(result) = result {
                body.insert("result".into(), result.clone());
            }
            if let Some(error) = error {
                body.insert("error".into(), json!(error));
            }
        }
        HubMessage::StreamInvocation {
            invocation_id,
            target,
            arguments,
        } => {
            body.insert("type".into(), json!(STREAM_INVOCATION));
            body.insert("invocationId".into(), json!(invocation_id));
            body.insert("target".into(), json!(target));
            body.insert("arguments".into(), Value::Array(arguments.clone()));
        }
        HubMessage::CancelInvocation { invocation_id } => {
            body.insert("type".into(), json!(CANCEL_INVOCATION));
            body.insert("invocationId".into(), json!(invocation_id));
        }
        HubMessage::Ping => {
            body.insert("type".into(), json!(PING));
        }
        HubMessage::Close {
            error,
            allow_reconnect,
        } => {
            body.insert("type".into(), json!(CLOSE));
            if let Some(error) = error {
                body.insert("error".into(), json!(error));
            }
            if *allow_reconnect {
                body.insert("allowReconnect".into(), json!(true));
            }
        }
    }
    terminate(&Value::Object(body))
}

pub fn handshake_request() -> String {
    terminate(&json!({ "protocol": PROTOCOL_NAME, "version": PROTOCOL_VERSION }))
}

#[derive(Debug, Default, Deserialize)]
struct HandshakeResponse {
    error: Option<String>,
}

/// Reads the handshake response at the start of `frame`. Returns whatever
/// follows it in the same frame; the server may pipeline messages right after.
pub fn split_handshake(frame: &str) -> Result<&str, TransportError> {
    let Some((head, rest)) = frame.split_once(RECORD_SEPARATOR) else {
        return Err(TransportError::Protocol(
            "incomplete handshake response".into(),
        ));
    };
    let response: HandshakeResponse = serde_json::from_str(head)?;
    match response.error {
        Some(error) => Err(TransportError::Handshake(error)),
        None => Ok(rest),
    }
}

fn terminate(value: &Value) -> String {
    let mut text = value.to_string();
    text.push(RECORD_SEPARATOR);
    text
}
