//! JSON-RPC Message Framing
//!
//! The wire shape shared by every carrier: requests, responses, and
//! notifications, plus the tool-result envelope that travels inside
//! `tools/call` responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ArmatureError, Result};

pub const JSONRPC_VERSION: &str = "2.0";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_LIST_TOOLS: &str = "tools/list";
pub const METHOD_CALL_TOOL: &str = "tools/call";
pub const METHOD_PING: &str = "ping";

pub const RPC_PARSE_ERROR: i64 = -32700;
pub const RPC_METHOD_NOT_FOUND: i64 = -32601;
pub const RPC_INVALID_PARAMS: i64 = -32602;
pub const RPC_INTERNAL_ERROR: i64 = -32603;
/// Timeout code relayed by servers; treated as retryable by the client.
pub const RPC_TIMEOUT_CODE: i64 = -32001;

/// A JSON-RPC message. Variant order matters for untagged deserialization:
/// a request carries both `id` and `method`, a response carries `id` without
/// `method`, a notification carries `method` without `id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcMessage {
    Request(RpcRequest),
    Response(RpcResponse),
    Notification(RpcNotification),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcMessage {
    pub fn request(id: impl Into<Value>, method: &str, params: Option<Value>) -> Self {
        RpcMessage::Request(RpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.to_string(),
            params,
        })
    }

    pub fn notification(method: &str, params: Option<Value>) -> Self {
        RpcMessage::Notification(RpcNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        })
    }

    pub fn success(id: Value, result: Value) -> Self {
        RpcMessage::Response(RpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        })
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        RpcMessage::Response(RpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        })
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, RpcMessage::Notification(_))
    }

    /// Parse an incoming JSON value as an RPC message, rejecting anything
    /// that does not match one of the three shapes.
    pub fn parse(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| ArmatureError::malformed(format!("not a valid RPC message: {}", e)))
    }
}

// ─── Tool Result Envelope ────────────────────────────────────────

/// One content entry inside a `tools/call` result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// The result payload of a `tools/call` response. The text payload is
/// either a JSON-encoded value or a human-readable error string detectable
/// by substring match on "Error".
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallEnvelope {
    pub content: Vec<ToolContent>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallEnvelope {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: true,
        }
    }

    /// The first text entry, or an empty string for a contentless envelope.
    pub fn first_text(&self) -> &str {
        self.content.first().map(|c| c.text.as_str()).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_roundtrip() {
        let msg = RpcMessage::request(7, METHOD_LIST_TOOLS, Some(json!({})));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "tools/list");

        match RpcMessage::parse(value).unwrap() {
            RpcMessage::Request(req) => assert_eq!(req.method, METHOD_LIST_TOOLS),
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_response_parses_as_response() {
        let value = json!({"jsonrpc": "2.0", "id": 3, "result": {"ok": true}});
        match RpcMessage::parse(value).unwrap() {
            RpcMessage::Response(resp) => {
                assert_eq!(resp.id, json!(3));
                assert!(resp.error.is_none());
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_notification_has_no_id() {
        let value = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        let msg = RpcMessage::parse(value).unwrap();
        assert!(msg.is_notification());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(RpcMessage::parse(json!({"hello": "world"})).is_err());
        assert!(RpcMessage::parse(json!("just a string")).is_err());
    }

    #[test]
    fn test_error_response_roundtrip() {
        let msg = RpcMessage::failure(json!(1), RPC_METHOD_NOT_FOUND, "no such method");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["error"]["code"], RPC_METHOD_NOT_FOUND);
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_envelope_error_detectable() {
        let env = ToolCallEnvelope::error("An error occurred: boom");
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["isError"], true);
        let back: ToolCallEnvelope = serde_json::from_value(value).unwrap();
        assert!(back.first_text().contains("Error"));
    }
}
