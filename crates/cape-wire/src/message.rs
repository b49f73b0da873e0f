//! Wire protocol message types.
//!
//! All communication between CAPE nodes uses JSON-framed messages over TCP.
//! Each message is prefixed with a 4-byte big-endian length header.

use serde::{Deserialize, Serialize};

/// JSON-RPC style code: the method does not exist on the target agent.
pub const METHOD_NOT_FOUND: i32 = -32601;

/// JSON-RPC style code: the params could not be interpreted.
pub const INVALID_PARAMS: i32 = -32602;

/// The addressed agent is not hosted on this node.
pub const AGENT_NOT_FOUND: i32 = 404;

/// The addressed agent has no open session.
pub const AGENT_NOT_CONNECTED: i32 = 503;

/// The handler itself failed.
pub const HANDLER_FAILED: i32 = 500;

/// A wire protocol message (envelope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Unique message ID; a response echoes the request's ID.
    pub id: String,
    /// Message variant.
    #[serde(flatten)]
    pub kind: WireMessageKind,
}

/// The different kinds of wire messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessageKind {
    /// Method invocation on a hosted agent.
    #[serde(rename = "request")]
    Request(WireRequest),
    /// Result of an invocation.
    #[serde(rename = "response")]
    Response(WireResponse),
}

/// A named method call addressed to one agent on the receiving node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRequest {
    /// Username part of the target agent's address.
    pub agent: String,
    /// Method name, e.g. `find` or `onNotification`.
    pub method: String,
    /// Named parameters.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Optional sender identity.
    #[serde(default)]
    pub sender: Option<String>,
}

/// Response messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireResponse {
    /// The call succeeded.
    Result(serde_json::Value),
    /// The call failed.
    Error(RpcFault),
}

/// Error payload of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcFault {
    /// Error code.
    pub code: i32,
    /// Error message.
    pub message: String,
}

impl RpcFault {
    /// Create a fault.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Unknown method.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    /// Params did not match the method's shape.
    pub fn invalid_params(reason: impl std::fmt::Display) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {reason}"))
    }

    /// The handler returned an application error.
    pub fn handler(reason: impl std::fmt::Display) -> Self {
        Self::new(HANDLER_FAILED, reason.to_string())
    }
}

impl std::fmt::Display for RpcFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Encode a wire message to bytes (4-byte big-endian length + JSON).
pub fn encode_message(msg: &WireMessage) -> Result<Vec<u8>, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    let len = json.len() as u32;
    let mut bytes = Vec::with_capacity(4 + json.len());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(&json);
    Ok(bytes)
}

/// Decode the length prefix from a 4-byte header.
pub fn decode_length(header: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*header)
}

/// Parse a JSON body into a WireMessage.
pub fn decode_message(body: &[u8]) -> Result<WireMessage, serde_json::Error> {
    serde_json::from_slice(body)
}
