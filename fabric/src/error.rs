//! Error taxonomy of the tool dialect.
//!
//! Every wire-visible failure maps onto a JSON-RPC error code; the one
//! client-local kind is [`WireError::Timeout`], which never crosses the wire.

use std::time::Duration;

use crate::message::ErrorObject;

/// Requested method is unknown to the server.
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
/// Missing or malformed arguments; schema violation.
pub const CODE_INVALID_PARAMS: i64 = -32602;
/// Handler raised; unexpected server state.
pub const CODE_INTERNAL: i64 = -32603;
/// Transport closed; recoverable by the client via reconnect.
pub const CODE_CONNECTION_LOST: i64 = -32000;

/// Failure in the tool dialect.
///
/// `Rpc` holds an error object as sent or received on the wire, so
/// code/message/data survive the client boundary verbatim. Use the named
/// constructors for the standard codes.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("rpc error {}: {}", .0.code, .0.message)]
    Rpc(ErrorObject),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl WireError {
    pub fn method_not_found(method: &str) -> Self {
        WireError::Rpc(ErrorObject::new(
            CODE_METHOD_NOT_FOUND,
            format!("method not found: {}", method),
        ))
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        WireError::Rpc(ErrorObject::new(CODE_INVALID_PARAMS, detail))
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        WireError::Rpc(ErrorObject::new(CODE_INTERNAL, detail))
    }

    pub fn connection_lost(detail: impl Into<String>) -> Self {
        WireError::Rpc(ErrorObject::new(CODE_CONNECTION_LOST, detail))
    }

    /// JSON-RPC code of this error; `Timeout` reports the connection-lost
    /// code since it never leaves the client.
    pub fn code(&self) -> i64 {
        match self {
            WireError::Rpc(obj) => obj.code,
            WireError::Timeout(_) => CODE_CONNECTION_LOST,
        }
    }

    /// True for transport-closed conditions, which the client treats as
    /// connection-lost (triggers reconnect), not as an application error.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, WireError::Rpc(obj) if obj.code == CODE_CONNECTION_LOST)
    }

    /// Error object for an outgoing error response.
    pub fn to_object(&self) -> ErrorObject {
        match self {
            WireError::Rpc(obj) => obj.clone(),
            WireError::Timeout(d) => ErrorObject::new(
                CODE_CONNECTION_LOST,
                format!("request timed out after {:?}", d),
            ),
        }
    }
}

impl From<ErrorObject> for WireError {
    fn from(obj: ErrorObject) -> Self {
        WireError::Rpc(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn standard_codes_map_one_to_one() {
        assert_eq!(WireError::method_not_found("x").code(), -32601);
        assert_eq!(WireError::invalid_params("p").code(), -32602);
        assert_eq!(WireError::internal("i").code(), -32603);
        assert_eq!(WireError::connection_lost("c").code(), -32000);
        assert!(WireError::connection_lost("c").is_connection_lost());
        assert!(!WireError::internal("i").is_connection_lost());
    }

    #[test]
    fn foreign_error_objects_round_trip_with_data() {
        let obj = ErrorObject {
            code: -32099,
            message: "custom".into(),
            data: Some(json!({"k": 1})),
        };
        let err = WireError::from(obj.clone());
        assert_eq!(err.to_object(), obj);
    }
}
