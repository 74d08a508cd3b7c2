//! JSON-RPC 2.0 envelope shared by every endpoint of the tool dialect.
//!
//! One frame carries one [`Message`]. Requests have an `id` and a `method`;
//! notifications have a `method` but no `id`; responses echo the request `id`
//! and carry exactly one of `result` or `error`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version constant carried in the `jsonrpc` field.
pub const JSONRPC_VERSION: &str = "2.0";

/// Dialect version exchanged during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Standard method names of the dialect.
pub mod method {
    pub const INITIALIZE: &str = "initialize";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";
    pub const PING: &str = "ping";
    pub const SHUTDOWN: &str = "shutdown";
}

/// Correlation id: string or integer per JSON-RPC 2.0.
///
/// The [`crate::client::ToolClient`] allocates integer ids; string ids are
/// accepted so foreign peers can use their own scheme.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Num(u64),
    Str(String),
}

impl MessageId {
    /// Returns the numeric form, if this id is an integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            MessageId::Num(n) => Some(*n),
            MessageId::Str(_) => None,
        }
    }
}

impl From<u64> for MessageId {
    fn from(n: u64) -> Self {
        MessageId::Num(n)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        MessageId::Str(s.to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Num(n) => write!(f, "{}", n),
            MessageId::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Error object carried in the `error` member of a response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// One frame of the dialect.
///
/// Invariant: exactly one of `method`, `result`, `error` is meaningful for a
/// given direction; `result` and `error` are mutually exclusive. Absent
/// optional fields are omitted on the wire, never serialized as null.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

impl Message {
    /// Builds a request frame with a correlation id.
    pub fn request(id: impl Into<MessageId>, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_version(),
            id: Some(id.into()),
            method: Some(method.to_string()),
            params,
            result: None,
            error: None,
        }
    }

    /// Builds a notification frame (no correlation id, no reply expected).
    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_version(),
            id: None,
            method: Some(method.to_string()),
            params,
            result: None,
            error: None,
        }
    }

    /// Builds a success response echoing the request id.
    pub fn response(id: MessageId, result: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id: Some(id),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response echoing the request id (None when the
    /// offending frame had no id).
    pub fn error_response(id: Option<MessageId>, error: ErrorObject) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            method: None,
            params: None,
            result: None,
            error: Some(error),
        }
    }

    /// True when this frame is a response (result or error set).
    pub fn is_response(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
