//! Armature Type Definitions
//!
//! All shared types for the tool-invocation framework: tool definitions,
//! auth proofs, the per-message prompt lifecycle, and the traits behind
//! which the LLM provider and the memory store live.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::schema::ToolSchema;

// ─── Tools ───────────────────────────────────────────────────────

/// A remotely-hosted tool as known to the registry.
///
/// `id` is derived from the owning server's name and the tool's declared
/// name, bounded to 64 chars because it is echoed into LLM prompts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub input_schema: ToolSchema,
    pub server_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_details: Option<crate::payment::PaymentDetails>,
}

// ─── Authentication ──────────────────────────────────────────────

/// Proof that the holder of a private key produced this exact call.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAuthProof {
    pub signature_base64_url: String,
    pub public_key_identifier: String,
    /// Millisecond timestamp; stale nonces fall outside the replay window.
    pub nonce: i64,
}

// ─── Prompt Lifecycle ────────────────────────────────────────────

/// A function call requested by the LLM. `arguments` is the raw provider
/// string, possibly several concatenated JSON fragments.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    pub name: String,
    pub call_id: String,
    pub arguments: String,
}

/// The recorded outcome of one function call.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallOutput {
    pub call_id: String,
    pub output: String,
}

/// One ordered (call, result) pair.
pub type ToolUse = (FunctionCall, FunctionCallOutput);

/// The unit of work for one user message through one or more LLM
/// round-trips. Created at the start of `message()`, mutated in place
/// through the loop, immutable once returned.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPromptState {
    pub agent_identity: String,
    pub agent_name: String,
    pub message_id: String,
    pub message: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    pub identity_prompt: String,
    pub context: Vec<String>,
    pub tool_uses: Vec<ToolUse>,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
}

// ─── LLM Collaborator ────────────────────────────────────────────

/// Progress sink for streaming text to an observer. Never affects control
/// flow, only observability.
pub type ProgressSink = Arc<dyn Fn(&str) + Send + Sync>;

/// The structured outcome of one LLM round-trip.
#[derive(Clone, Debug, Default)]
pub struct LlmTurn {
    pub output_text: String,
    pub function_call: Option<FunctionCall>,
    pub response_id: Option<String>,
}

/// Model settings for the LLM provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// The LLM provider seam. Streaming implementations must resolve to the
/// same structured result as non-streaming ones.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn prompt(
        &self,
        state: &AgentPromptState,
        tools: &[ToolDefinition],
        on_chunk: Option<ProgressSink>,
    ) -> anyhow::Result<LlmTurn>;
}

// ─── Memory Collaborator ─────────────────────────────────────────

/// Context strings recalled for a prompt state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RecallResult {
    #[serde(default)]
    pub context: Vec<String>,
}

/// The external memory store, consumed only through recall and create.
/// Both are best-effort from the loop's perspective.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn recall(&self, state: &AgentPromptState) -> anyhow::Result<RecallResult>;
    async fn create(&self, state: &AgentPromptState) -> anyhow::Result<AgentPromptState>;
}

// ─── Servers ─────────────────────────────────────────────────────

/// Identity a tool server reports during the initialize handshake.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

// ─── Configuration ───────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Runtime configuration for the agent binary.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub name: String,
    /// Identity prompt lines, joined with newlines when prompting.
    pub bio: Vec<String>,
    pub model: ModelConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_url: Option<String>,
    pub tool_servers: Vec<String>,
    pub serve_port: u16,
    pub log_level: LogLevel,
}

/// Returns a default `AgentConfig`. Fields with no sensible default are
/// left empty so callers can override them.
pub fn default_config() -> AgentConfig {
    AgentConfig {
        name: String::new(),
        bio: Vec::new(),
        model: ModelConfig {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: String::new(),
            temperature: None,
            max_tokens: Some(4096),
        },
        memory_url: None,
        tool_servers: Vec::new(),
        serve_port: 8888,
        log_level: LogLevel::Info,
    }
}
