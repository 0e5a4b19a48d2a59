//! Tool Server
//!
//! Hosts registered tools behind the two carriers: the `/rpc`
//! request/response endpoint and the `/sse` + `/messages` streaming pair.
//! Dispatch validates arguments, enforces payment gates, and wraps every
//! outcome in the text envelope so callers can always reason about results
//! as plain text.

pub mod tool;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};

use crate::auth::{jwt, proof};
use crate::error::ArmatureError;
use crate::payment::gated_description;
use crate::rpc::{
    RpcMessage, RpcRequest, ToolCallEnvelope, METHOD_CALL_TOOL, METHOD_INITIALIZE,
    METHOD_LIST_TOOLS, METHOD_PING, RPC_INVALID_PARAMS, RPC_METHOD_NOT_FOUND,
};
use crate::transport::sse::{SessionStream, SessionTable, MESSAGE_PATH, SSE_PATH};
use crate::types::{ServerInfo, ToolAuthProof};

use self::tool::ServerTool;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub struct ToolServer {
    info: ServerInfo,
    tools: HashMap<String, Arc<dyn ServerTool>>,
}

impl ToolServer {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            info: ServerInfo {
                name: name.to_string(),
                version: version.to_string(),
            },
            tools: HashMap::new(),
        }
    }

    pub fn register(mut self, tool: impl ServerTool + 'static) -> Self {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
        self
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// The tools array advertised by `tools/list`. Gated tools advertise
    /// their gate sentence and marker inside the description.
    fn advertised_tools(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| {
                let description = match tool.payment_details() {
                    Some(details) => gated_description(tool.description(), &details),
                    None => tool.description().to_string(),
                };
                json!({
                    "name": tool.name(),
                    "description": description,
                    "inputSchema": tool.schema().to_json_schema(),
                })
            })
            .collect()
    }

    /// Handle one inbound message. Requests produce exactly one response;
    /// notifications and stray responses produce none.
    pub async fn handle_message(&self, message: RpcMessage) -> Option<RpcMessage> {
        match message {
            RpcMessage::Request(request) => Some(self.handle_request(request).await),
            RpcMessage::Notification(notification) => {
                tracing::debug!(method = %notification.method, "notification received");
                None
            }
            RpcMessage::Response(_) => None,
        }
    }

    async fn handle_request(&self, request: RpcRequest) -> RpcMessage {
        match request.method.as_str() {
            METHOD_INITIALIZE => RpcMessage::success(
                request.id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": self.info.clone(),
                }),
            ),
            METHOD_LIST_TOOLS => {
                RpcMessage::success(request.id, json!({ "tools": self.advertised_tools() }))
            }
            METHOD_CALL_TOOL => {
                let params = request.params.unwrap_or(Value::Null);
                match self.dispatch_tool_call(params).await {
                    Ok(envelope) => match serde_json::to_value(&envelope) {
                        Ok(result) => RpcMessage::success(request.id, result),
                        Err(e) => RpcMessage::failure(
                            request.id,
                            RPC_INVALID_PARAMS,
                            format!("could not encode tool result: {}", e),
                        ),
                    },
                    Err(message) => {
                        RpcMessage::failure(request.id, RPC_INVALID_PARAMS, message)
                    }
                }
            }
            METHOD_PING => RpcMessage::success(request.id, json!({ "ok": true })),
            other => RpcMessage::failure(
                request.id,
                RPC_METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        }
    }

    /// Run one tool call. Protocol-shape problems are `Err` (the caller
    /// turns them into an RPC error); everything else, including tool and
    /// auth failures, is an envelope so the text contract holds.
    async fn dispatch_tool_call(
        &self,
        params: Value,
    ) -> std::result::Result<ToolCallEnvelope, String> {
        let name = params["name"]
            .as_str()
            .ok_or_else(|| "tool call params must carry a tool name".to_string())?;

        let mut args: Map<String, Value> = match params.get("arguments") {
            None => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err("tool arguments must be an object".to_string()),
        };

        let Some(tool) = self.tools.get(name) else {
            return Ok(ToolCallEnvelope::error(format!(
                "An error occurred: unknown tool '{}'",
                name
            )));
        };

        // The proof travels inside the arguments and is never part of the
        // signed or validated payload.
        let auth: Option<ToolAuthProof> = args
            .remove("auth")
            .and_then(|value| serde_json::from_value(value).ok());

        if let Err(e) = tool.schema().validate(&args) {
            return Ok(ToolCallEnvelope::error(format!("An error occurred: {}", e)));
        }

        if let Some(details) = tool.payment_details() {
            match auth {
                None => {
                    tracing::warn!(tool = %name, "gated tool call without auth proof");
                    return Ok(ToolCallEnvelope::error(format!(
                        "Authentication Error: tool '{}' is gated ({}) and no auth proof was provided",
                        name,
                        details.sentence()
                    )));
                }
                Some(ref auth_proof) => {
                    if let Err(e) = proof::verify_proof(auth_proof, &args) {
                        tracing::warn!(tool = %name, error = %e, "auth proof rejected");
                        return Ok(ToolCallEnvelope::error(format!(
                            "Authentication Error: {}",
                            e
                        )));
                    }
                }
            }
        }

        match tool.execute(args).await {
            Ok(Value::String(text)) => Ok(ToolCallEnvelope::success(text)),
            Ok(value) => match serde_json::to_string(&value) {
                Ok(text) => Ok(ToolCallEnvelope::success(text)),
                Err(e) => Ok(ToolCallEnvelope::error(format!("An error occurred: {}", e))),
            },
            Err(e) => Ok(ToolCallEnvelope::error(format!("An error occurred: {}", e))),
        }
    }
}

// ─── HTTP Surface ────────────────────────────────────────────────

#[derive(Clone)]
struct AppState {
    server: Arc<ToolServer>,
    sessions: Arc<SessionTable>,
}

/// Build the axum router exposing both carriers for a tool server.
pub fn router(server: Arc<ToolServer>) -> Router {
    let state = AppState {
        server,
        sessions: Arc::new(SessionTable::default()),
    };

    Router::new()
        .route("/rpc", post(handle_rpc))
        .route(SSE_PATH, get(handle_sse_open))
        .route(MESSAGE_PATH, post(handle_session_message))
        .with_state(state)
}

/// Bind and serve until shutdown.
pub async fn serve(server: Arc<ToolServer>, port: u16) -> anyhow::Result<()> {
    let app = router(server);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("starting tool server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_rpc(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> Response {
    if let Err(rejection) = screen_bearer(&headers, &value) {
        return rejection;
    }

    let message = match RpcMessage::parse(value) {
        Ok(message) => message,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    match state.server.handle_message(message).await {
        Some(reply) => Json(reply).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Validate a bearer token when one is presented on a `tools/call`.
///
/// Absence is not an error at this layer; per-call proofs gate the tools
/// themselves. An invalid token is always rejected and logged for audit.
fn screen_bearer(headers: &HeaderMap, value: &Value) -> std::result::Result<(), Response> {
    if value.get("method").and_then(|m| m.as_str()) != Some(METHOD_CALL_TOOL) {
        return Ok(());
    }

    let Some(auth_header) = headers.get(header::AUTHORIZATION) else {
        return Ok(());
    };

    let token = auth_header
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "));

    match token.map(|t| jwt::verify_jwt(t, None)) {
        Some(Ok(claims)) => {
            tracing::debug!(subject = %claims.sub, "bearer token accepted");
            Ok(())
        }
        Some(Err(e)) => {
            tracing::warn!(error = %e, "bearer token rejected");
            Err((
                StatusCode::UNAUTHORIZED,
                format!("Authentication Error: {}", e),
            )
                .into_response())
        }
        None => Err((
            StatusCode::UNAUTHORIZED,
            ArmatureError::auth("malformed Authorization header").to_string(),
        )
            .into_response()),
    }
}

async fn handle_sse_open(State(state): State<AppState>) -> Sse<SessionStream> {
    let (session_id, sse) = state.sessions.open();
    tracing::info!(session_id = %session_id, "streaming session opened");
    sse
}

async fn handle_session_message(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.contains("application/json") {
        return (
            StatusCode::BAD_REQUEST,
            format!("Unsupported content-type: {}", content_type),
        )
            .into_response();
    }

    let Some(session_id) = params.get("sessionId") else {
        return (StatusCode::BAD_REQUEST, "missing sessionId".to_string()).into_response();
    };

    let Some(sender) = state.sessions.sender(session_id) else {
        return (
            StatusCode::BAD_REQUEST,
            format!("no open stream for session {}", session_id),
        )
            .into_response();
    };

    let message = match serde_json::from_str::<Value>(&body)
        .map_err(ArmatureError::from)
        .and_then(RpcMessage::parse)
    {
        Ok(message) => message,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    if let Some(reply) = state.server.handle_message(message).await {
        let data = match serde_json::to_string(&reply) {
            Ok(data) => data,
            Err(e) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        };
        if sender
            .send(Event::default().event("message").data(data))
            .await
            .is_err()
        {
            state.sessions.remove(session_id);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "session stream closed".to_string(),
            )
                .into_response();
        }
    }

    (StatusCode::ACCEPTED, "Accepted").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AgentSigner;
    use crate::payment::PaymentDetails;
    use super::tool::EchoTool;

    fn test_server() -> ToolServer {
        ToolServer::new("test", "1.0.0")
            .register(EchoTool::free("echo-free"))
            .register(EchoTool::gated(
                "echo-paid",
                PaymentDetails::TokenGated {
                    chain: "solana".to_string(),
                    token_address: "TEST".to_string(),
                    amount_ui: 1.0,
                    description: None,
                },
            ))
    }

    async fn call(server: &ToolServer, params: Value) -> ToolCallEnvelope {
        let request = RpcMessage::request(1, METHOD_CALL_TOOL, Some(params));
        let reply = server.handle_message(request).await.unwrap();
        let RpcMessage::Response(response) = reply else {
            panic!("expected response");
        };
        serde_json::from_value(response.result.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_free_tool_call_succeeds_without_auth() {
        let server = test_server();
        let envelope = call(
            &server,
            json!({"name": "echo-free", "arguments": {"message": "test"}}),
        )
        .await;
        assert!(!envelope.is_error);
        let value: Value = serde_json::from_str(envelope.first_text()).unwrap();
        assert_eq!(value, json!({"echoed": {"message": "test"}}));
    }

    #[tokio::test]
    async fn test_gated_tool_rejects_missing_auth() {
        let server = test_server();
        let envelope = call(
            &server,
            json!({"name": "echo-paid", "arguments": {"message": "test"}}),
        )
        .await;
        assert!(envelope.is_error);
        assert!(envelope.first_text().contains("Authentication Error"));
    }

    #[tokio::test]
    async fn test_gated_tool_accepts_valid_proof() {
        let server = test_server();
        let signer = AgentSigner::generate();

        let mut args = Map::new();
        args.insert("message".to_string(), json!("test"));
        let auth = signer.sign_args(&args).unwrap();

        let envelope = call(
            &server,
            json!({
                "name": "echo-paid",
                "arguments": {
                    "message": "test",
                    "auth": serde_json::to_value(&auth).unwrap(),
                }
            }),
        )
        .await;
        assert!(!envelope.is_error, "{}", envelope.first_text());
        let value: Value = serde_json::from_str(envelope.first_text()).unwrap();
        assert_eq!(value, json!({"echoed": {"message": "test"}}));
    }

    #[tokio::test]
    async fn test_invalid_arguments_rejected() {
        let server = test_server();
        let envelope = call(
            &server,
            json!({"name": "echo-free", "arguments": {"message": 42}}),
        )
        .await;
        assert!(envelope.is_error);
        assert!(envelope.first_text().contains("An error occurred"));
    }

    #[tokio::test]
    async fn test_unknown_tool_returns_error_envelope() {
        let server = test_server();
        let envelope = call(&server, json!({"name": "nope", "arguments": {}})).await;
        assert!(envelope.is_error);
        assert!(envelope.first_text().contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_unknown_method_is_rpc_error() {
        let server = test_server();
        let request = RpcMessage::request(9, "bogus/method", None);
        let reply = server.handle_message(request).await.unwrap();
        let RpcMessage::Response(response) = reply else {
            panic!("expected response");
        };
        assert_eq!(response.error.unwrap().code, RPC_METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_notifications_get_no_reply() {
        let server = test_server();
        let note = RpcMessage::notification("notifications/initialized", None);
        assert!(server.handle_message(note).await.is_none());
    }

    #[tokio::test]
    async fn test_tools_list_advertises_gate_marker() {
        let server = test_server();
        let request = RpcMessage::request(2, METHOD_LIST_TOOLS, None);
        let reply = server.handle_message(request).await.unwrap();
        let RpcMessage::Response(response) = reply else {
            panic!("expected response");
        };
        let tools = response.result.unwrap()["tools"].clone();
        let paid = tools
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["name"] == "echo-paid")
            .unwrap();
        assert!(paid["description"]
            .as_str()
            .unwrap()
            .contains("scheme=token-gated"));
    }
}
