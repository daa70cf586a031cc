//! Wire framing
//!
//! Outbound requests are JSON objects carrying `@type` plus an `@extra`
//! correlation token. Inbound objects either echo that token (a response)
//! or omit it, in which case their tag must follow the `update` naming
//! convention. The reserved `error` discriminator marks an engine-reported
//! failure.

use crate::errors::{CoreError, Result};
use crate::object::TaggedObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Key carrying the correlation token on the wire
pub const EXTRA_KEY: &str = "@extra";

/// Reserved discriminator for engine-reported errors
pub const ERROR_TAG: &str = "error";

/// Tag prefix every un-correlated push event carries
pub const UPDATE_PREFIX: &str = "update";

/// Correlation token attached to a request and echoed on its response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(pub u64);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Engine-reported failure carried by an `error` object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFailure {
    /// Engine error code
    pub code: i32,
    /// Engine error message
    pub message: String,
}

/// Classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Successful response to a correlated request
    Result {
        /// Echoed correlation token
        token: Token,
        /// Result object
        object: TaggedObject,
    },
    /// Engine-reported error for a correlated request
    Error {
        /// Echoed correlation token
        token: Token,
        /// Code and message from the engine
        failure: EngineFailure,
    },
    /// Un-correlated push event
    Update(TaggedObject),
    /// Un-tokened object whose tag is not an update
    Unroutable {
        /// Offending tag
        tag: String,
    },
}

/// Whether a tag follows the update naming convention
pub fn is_update_tag(tag: &str) -> bool {
    tag.len() > UPDATE_PREFIX.len()
        && tag.starts_with(UPDATE_PREFIX)
        && tag[UPDATE_PREFIX.len()..].starts_with(|c: char| c.is_ascii_uppercase())
}

/// Serialize a request with its correlation token
pub fn encode_request(token: Token, object: &TaggedObject) -> Result<String> {
    let mut value = object.to_value();
    if let Value::Object(map) = &mut value {
        map.insert(EXTRA_KEY.to_string(), Value::from(token.0));
    }
    Ok(serde_json::to_string(&value)?)
}

/// Serialize an object without a correlation token (local execution)
pub fn encode_object(object: &TaggedObject) -> Result<String> {
    Ok(serde_json::to_string(&object.to_value())?)
}

/// Parse an outbound request frame back into its token and object.
///
/// Used by engine-side peers and test harnesses.
pub fn decode_request(frame: &str) -> Result<(Option<Token>, TaggedObject)> {
    let value: Value = serde_json::from_str(frame)?;
    split_token(value)
}

/// Parse a reply to a local execution, mapping `error` to its failure
pub fn decode_reply(frame: &str) -> Result<std::result::Result<TaggedObject, EngineFailure>> {
    let value: Value = serde_json::from_str(frame)?;
    let (_, object) = split_token(value)?;
    if object.tag() == ERROR_TAG {
        Ok(Err(engine_failure(&object)))
    } else {
        Ok(Ok(object))
    }
}

/// Classify an inbound frame.
///
/// Returns `Err` only for frames that cannot be decoded at all; an object
/// that decodes but fits no route comes back as [`IncomingMessage::Unroutable`].
pub fn decode_incoming(frame: &str) -> Result<IncomingMessage> {
    let value: Value = serde_json::from_str(frame)?;
    let (token, object) = split_token(value)?;

    Ok(match token {
        Some(token) if object.tag() == ERROR_TAG => IncomingMessage::Error {
            token,
            failure: engine_failure(&object),
        },
        Some(token) => IncomingMessage::Result { token, object },
        None if is_update_tag(object.tag()) => IncomingMessage::Update(object),
        None => IncomingMessage::Unroutable {
            tag: object.tag().to_string(),
        },
    })
}

/// Build the wire object for an engine error
pub fn error_object(code: i32, message: impl Into<String>) -> TaggedObject {
    TaggedObject::new(ERROR_TAG)
        .with("code", code)
        .with("message", message.into())
}

fn split_token(value: Value) -> Result<(Option<Token>, TaggedObject)> {
    let Value::Object(mut map) = value else {
        return Err(CoreError::codec("frame is not a JSON object"));
    };
    let token = match map.remove(EXTRA_KEY) {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(Token(n.as_u64().ok_or_else(|| {
            CoreError::codec(format!("correlation token `{n}` is not an unsigned integer"))
        })?)),
        Some(other) => {
            return Err(CoreError::codec(format!(
                "correlation token must be an integer, found {}",
                crate::object::json_kind(&other)
            )))
        }
    };
    let object = TaggedObject::from_value(Value::Object(map))?;
    Ok((token, object))
}

fn engine_failure(object: &TaggedObject) -> EngineFailure {
    let code = object
        .get_i64("code")
        .and_then(|code| i32::try_from(code).ok())
        .unwrap_or_default();
    EngineFailure {
        code,
        message: object.get_str("message").unwrap_or_default().to_string(),
    }
}
