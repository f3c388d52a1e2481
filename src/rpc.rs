//! JSON-RPC 2.0 framing for the XSWD wire protocol.
//!
//! Only single requests are served; a frame decoding to a batch of more
//! than one request is rejected with `PARSE_ERROR` (wire contract of the
//! original protocol). Response ids are always strings: string ids pass
//! through, numeric ids are rendered in decimal, absent ids become `""`.

use serde::Deserialize;
use serde_json::Value;

pub use crate::error::RpcError;

// Conventional JSON-RPC 2.0 codes.
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const CANCELLED: i32 = -32001;

// Gateway-specific codes (stable wire contract).
pub const PERMISSION_DENIED: i32 = -32043;
pub const PERMISSION_ALWAYS_DENIED: i32 = -32044;
pub const RATE_LIMIT_EXCEEDED: i32 = -32070;

/// A single inbound JSON-RPC request.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// The request id in its wire-response form.
    pub fn id_string(&self) -> String {
        match &self.id {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => other.to_string(),
        }
    }
}

/// An outbound JSON-RPC response or unsolicited notification.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Successful response mirroring `request`'s id; pass `None` for
    /// unsolicited notifications (id becomes `""`).
    pub fn with_result(request: Option<&RpcRequest>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: request.map(RpcRequest::id_string).unwrap_or_default(),
            result: Some(result),
            error: None,
        }
    }

    /// Error response mirroring `request`'s id when present.
    pub fn with_error(request: Option<&RpcRequest>, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id: request.map(RpcRequest::id_string).unwrap_or_default(),
            result: None,
            error: Some(error),
        }
    }
}

/// Why an inbound frame could not be turned into a request.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Error while parsing request")]
    Malformed,

    #[error("Batch requests are not supported")]
    Batch,
}

impl FrameError {
    pub fn to_rpc_error(&self) -> RpcError {
        RpcError::new(PARSE_ERROR, self.to_string())
    }
}

/// Parse one websocket frame into a single request.
///
/// A one-element array is unwrapped and served as a single request; any
/// other array length is a batch and is refused.
pub fn parse_frame(bytes: &[u8]) -> std::result::Result<RpcRequest, FrameError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|_| FrameError::Malformed)?;

    let single = match value {
        Value::Array(mut entries) => match entries.len() {
            1 => entries.remove(0),
            0 => return Err(FrameError::Malformed),
            _ => return Err(FrameError::Batch),
        },
        other => other,
    };

    let request: RpcRequest =
        serde_json::from_value(single).map_err(|_| FrameError::Malformed)?;
    if request.jsonrpc != "2.0" {
        return Err(FrameError::Malformed);
    }

    Ok(request)
}
