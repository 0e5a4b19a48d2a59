//! Tool Registry & Connection Manager
//!
//! Discovers tools from declared server addresses, keeps the local
//! registry consistent, and executes calls against remote servers. Every
//! call opens and tears down its own connection; a stuck server cannot
//! starve anyone else. Failures come back as descriptive string values,
//! never exceptions, so the agent loop can feed them to the LLM as
//! observable context.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use regex::Regex;
use serde_json::{json, Map, Value};
use sha3::{Digest, Sha3_256};
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use crate::auth::AgentSigner;
use crate::error::{ArmatureError, Result};
use crate::payment::extract_gate;
use crate::rpc::{RpcMessage, ToolCallEnvelope, METHOD_CALL_TOOL, METHOD_INITIALIZE, METHOD_LIST_TOOLS};
use crate::schema::ToolSchema;
use crate::transport::http::HttpClientTransport;
use crate::transport::Transport;
use crate::types::{ProgressSink, ToolDefinition};

/// Additional connection attempts after the first handshake failure.
pub const MAX_CONNECT_RETRIES: u32 = 3;

/// Additional call attempts after a timeout (3 attempts total).
pub const MAX_CALL_RETRIES: u32 = 2;

/// Tool ids are echoed into LLM prompts and must stay short.
pub const TOOL_ID_MAX_LEN: usize = 64;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CONNECT_RETRY_STEP: Duration = Duration::from_secs(1);
const DEFAULT_CALL_RETRY_BASE: Duration = Duration::from_secs(1);

pub struct ToolRegistry {
    tools: RwLock<HashMap<String, ToolDefinition>>,
    servers: RwLock<Vec<String>>,
    signer: Option<Arc<AgentSigner>>,
    call_timeout: Duration,
    connect_retry_step: Duration,
    call_retry_base: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            servers: RwLock::new(Vec::new()),
            signer: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            connect_retry_step: DEFAULT_CONNECT_RETRY_STEP,
            call_retry_base: DEFAULT_CALL_RETRY_BASE,
        }
    }

    /// Attach a signing identity; outgoing `tools/call` requests then carry
    /// a bearer token.
    pub fn with_signer(mut self, signer: Arc<AgentSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Override the call timeout and retry delays.
    pub fn with_timing(
        mut self,
        call_timeout: Duration,
        connect_retry_step: Duration,
        call_retry_base: Duration,
    ) -> Self {
        self.call_timeout = call_timeout;
        self.connect_retry_step = connect_retry_step;
        self.call_retry_base = call_retry_base;
        self
    }

    /// Discover tools from every address concurrently. One address's
    /// failure never blocks another's contribution; all outcomes are
    /// collected before returning the full list of added tool ids.
    pub async fn init(&self, addresses: &[String]) -> Vec<String> {
        let discoveries = addresses
            .iter()
            .map(|address| self.add_server(address))
            .collect::<Vec<_>>();

        join_all(discoveries).await.into_iter().flatten().collect()
    }

    /// Connect to one server, fetch its identity and tool list, and insert
    /// the derived definitions.
    ///
    /// Connection failures retry with linearly increasing delay; when every
    /// attempt fails the server is skipped, the registry is untouched, and
    /// an empty id list comes back. The connection is released once the
    /// tool list is registered.
    pub async fn add_server(&self, address: &str) -> Vec<String> {
        let transport = self.transport_for(address);

        tracing::info!("connecting to tool server: {}", address);

        let mut attempt: u32 = 0;
        let init_result = loop {
            match self
                .send_request(&transport, METHOD_INITIALIZE, Some(json!({})))
                .await
            {
                Ok(result) => break result,
                Err(e) => {
                    if attempt >= MAX_CONNECT_RETRIES {
                        tracing::error!(
                            "failed to connect to tool server {} after {} attempts: {}",
                            address,
                            attempt + 1,
                            e
                        );
                        return Vec::new();
                    }
                    attempt += 1;
                    tracing::warn!(
                        "connection attempt to {} failed ({}), retrying...",
                        address,
                        e
                    );
                    sleep(self.connect_retry_step * attempt).await;
                }
            }
        };

        let server_name = init_result["serverInfo"]["name"]
            .as_str()
            .unwrap_or(address)
            .to_string();

        let tools_result = match self
            .send_request(&transport, METHOD_LIST_TOOLS, Some(json!({})))
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("failed to list tools from {}: {}", address, e);
                let _ = transport.close().await;
                return Vec::new();
            }
        };

        let mut added = Vec::new();
        if let Some(entries) = tools_result["tools"].as_array() {
            let mut tools = self.tools.write().await;
            for entry in entries {
                let Some(name) = entry["name"].as_str() else {
                    continue;
                };
                let description = entry["description"].as_str().unwrap_or("").to_string();
                let id = derive_tool_id(&server_name, name);

                tools.insert(
                    id.clone(),
                    ToolDefinition {
                        id: id.clone(),
                        name: name.to_string(),
                        description: description.clone(),
                        input_schema: ToolSchema::from_json_schema(&entry["inputSchema"]),
                        server_address: address.to_string(),
                        payment_details: extract_gate(&description),
                    },
                );
                added.push(id);
            }
        }

        {
            let mut servers = self.servers.write().await;
            if !servers.iter().any(|s| s == address) {
                servers.push(address.to_string());
            }
        }

        let _ = transport.close().await;
        tracing::info!("registered {} tools from {}", added.len(), address);
        added
    }

    pub async fn get(&self, id: &str) -> Option<ToolDefinition> {
        self.tools.read().await.get(id).cloned()
    }

    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.read().await.values().cloned().collect()
    }

    pub async fn server_addresses(&self) -> Vec<String> {
        self.servers.read().await.clone()
    }

    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    /// Execute a registered tool. Unknown ids resolve to a descriptive
    /// string result; lookups never raise.
    pub async fn call_tool(
        &self,
        id: &str,
        args: Map<String, Value>,
        on_progress: Option<ProgressSink>,
    ) -> Value {
        let definition = self.get(id).await;
        let Some(definition) = definition else {
            tracing::error!("tool {} not found", id);
            return Value::String(format!("Tool {} not found", id));
        };
        let address = definition.server_address.clone();
        self.call_tool_with_retries(&definition, &address, args, on_progress)
            .await
    }

    /// The retrying call primitive. Opens a fresh connection scoped to this
    /// single call, invokes the remote tool under the call timeout, and
    /// closes the connection regardless of outcome.
    ///
    /// Only timeout-class errors retry, with exponential backoff and a
    /// progress notice before each attempt; validation and business errors
    /// come back immediately as descriptive strings.
    pub async fn call_tool_with_retries(
        &self,
        definition: &ToolDefinition,
        address: &str,
        args: Map<String, Value>,
        on_progress: Option<ProgressSink>,
    ) -> Value {
        let mut retry_count: u32 = 0;
        loop {
            match self.single_call(definition, address, &args).await {
                Ok(value) => return value,
                Err(e) if e.is_timeout() => {
                    if retry_count < MAX_CALL_RETRIES {
                        retry_count += 1;
                        let notice = format!(
                            "Timeout detected. Retrying ({}/{})...",
                            retry_count, MAX_CALL_RETRIES
                        );
                        tracing::warn!(tool = %definition.id, "{}", notice);
                        if let Some(ref sink) = on_progress {
                            sink(&notice);
                        }
                        sleep(self.call_retry_base * 2u32.pow(retry_count - 1)).await;
                        continue;
                    }
                    return Value::String(format!(
                        "Tool {} failed after {} attempts due to timeout",
                        definition.id,
                        MAX_CALL_RETRIES + 1
                    ));
                }
                Err(e) => {
                    tracing::error!("error calling tool {}: {}", definition.id, e);
                    return Value::String(format!(
                        "Failed to call tool {}: {}",
                        definition.id, e
                    ));
                }
            }
        }
    }

    async fn single_call(
        &self,
        definition: &ToolDefinition,
        address: &str,
        args: &Map<String, Value>,
    ) -> Result<Value> {
        let transport = self.transport_for(address);

        let params = json!({
            "name": definition.name,
            "arguments": Value::Object(args.clone()),
        });
        let outcome = self
            .send_request(&transport, METHOD_CALL_TOOL, Some(params))
            .await;
        let _ = transport.close().await;

        let result = outcome?;
        let envelope: ToolCallEnvelope = serde_json::from_value(result)?;
        let text = envelope.first_text();

        if text.contains("Error") {
            return Ok(Value::String(format!(
                "The tool has failed with the following error: {}",
                text
            )));
        }

        Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
    }

    /// Send one request over a carrier and unwrap the correlated response,
    /// under the registry's call timeout.
    async fn send_request(
        &self,
        transport: &HttpClientTransport,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value> {
        let request = RpcMessage::request(Uuid::new_v4().to_string(), method, params);

        let reply = timeout(self.call_timeout, transport.send(&request))
            .await
            .map_err(|_| ArmatureError::Timeout)??;

        match reply {
            Some(RpcMessage::Response(response)) => {
                if let Some(e) = response.error {
                    return Err(ArmatureError::Rpc {
                        code: e.code,
                        message: e.message,
                    });
                }
                Ok(response.result.unwrap_or(Value::Null))
            }
            Some(_) => Err(ArmatureError::malformed("expected a response message")),
            None => Err(ArmatureError::malformed("request received no reply")),
        }
    }

    fn transport_for(&self, address: &str) -> HttpClientTransport {
        match &self.signer {
            Some(signer) => HttpClientTransport::with_signer(address, Arc::clone(signer)),
            None => HttpClientTransport::new(address),
        }
    }
}

// ─── Tool Identifiers ────────────────────────────────────────────

/// Replace anything outside `[a-zA-Z0-9_]` with underscores.
pub fn normalize_tool_name(name: &str) -> String {
    match Regex::new(r"[^a-zA-Z0-9_]+") {
        Ok(re) => re.replace_all(name, "_").to_string(),
        Err(_) => name.to_string(),
    }
}

/// Derive the registry id for a tool: a short hash of the server's
/// declared name joined to the normalized tool name, truncated to the
/// prompt-safe ceiling. Two servers exposing a tool of the same human name
/// get distinct ids; the same server always yields the same id.
pub fn derive_tool_id(server_name: &str, tool_name: &str) -> String {
    let digest = Sha3_256::digest(server_name.as_bytes());
    let prefix = hex::encode(&digest[..6]);

    let mut id = format!("{}_{}", prefix, normalize_tool_name(tool_name));
    id.truncate(TOOL_ID_MAX_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_tool_id_is_deterministic() {
        assert_eq!(
            derive_tool_id("market-server", "get price"),
            derive_tool_id("market-server", "get price")
        );
    }

    #[test]
    fn test_same_tool_name_on_different_servers_does_not_collide() {
        assert_ne!(
            derive_tool_id("server-a", "echo"),
            derive_tool_id("server-b", "echo")
        );
    }

    #[test]
    fn test_tool_id_is_bounded_and_prompt_safe() {
        let id = derive_tool_id(
            "a very long server name with spaces and punctuation!!!",
            "an equally long tool name that would overflow any sane budget",
        );
        assert!(id.len() <= TOOL_ID_MAX_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn test_normalize_tool_name_collapses_runs() {
        assert_eq!(normalize_tool_name("get -- price"), "get_price");
        assert_eq!(normalize_tool_name("already_fine"), "already_fine");
    }
}
