//! The Agent Loop
//!
//! Drives one user message to completion: recall memory, prompt the LLM,
//! sign and execute any requested tool call, feed the result back as
//! context, repeat up to the prompt bound, persist the turn.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::AgentSigner;
use crate::registry::ToolRegistry;
use crate::types::{
    AgentPromptState, FunctionCallOutput, LlmClient, MemoryStore, ProgressSink,
};

/// Maximum LLM round-trips for one message. Reaching the bound is a soft
/// termination, not an error: the state keeps whatever partial output
/// exists.
pub const MAX_PROMPTS: usize = 10;

/// Who the agent is when it prompts.
#[derive(Clone, Debug)]
pub struct Persona {
    pub name: String,
    pub bio: Vec<String>,
}

/// Per-message options.
#[derive(Default)]
pub struct MessageOpts {
    pub channel_id: Option<String>,
    /// Provider chaining token from an earlier turn. When present, memory
    /// recall is skipped; the provider already holds the context.
    pub previous_response_id: Option<String>,
    pub additional_context: Vec<(String, String)>,
    pub on_progress: Option<ProgressSink>,
}

/// An interactive agent that signs and routes tool calls through the
/// registry, and recalls/persists conversational memory around each turn.
pub struct ToolAgent {
    persona: Persona,
    signer: Arc<AgentSigner>,
    registry: Arc<ToolRegistry>,
    llm: Arc<dyn LlmClient>,
    memory: Option<Arc<dyn MemoryStore>>,
}

impl ToolAgent {
    pub fn new(
        persona: Persona,
        signer: Arc<AgentSigner>,
        registry: Arc<ToolRegistry>,
        llm: Arc<dyn LlmClient>,
        memory: Option<Arc<dyn MemoryStore>>,
    ) -> Self {
        Self {
            persona,
            signer,
            registry,
            llm,
            memory,
        }
    }

    pub fn identifier(&self) -> &str {
        self.signer.identifier()
    }

    /// Process one incoming user message through the bounded prompt loop
    /// and return the completed state.
    pub async fn message(
        &self,
        message: &str,
        opts: MessageOpts,
    ) -> anyhow::Result<AgentPromptState> {
        let mut state = AgentPromptState {
            agent_identity: self.signer.identifier().to_string(),
            agent_name: self.persona.name.clone(),
            message_id: Uuid::new_v4().to_string(),
            message: message.to_string(),
            created_at: Utc::now().to_rfc3339(),
            channel_id: opts.channel_id.clone(),
            identity_prompt: self.persona.bio.join("\n"),
            context: opts
                .additional_context
                .iter()
                .map(|(key, value)| format!("{}: {}", key, value))
                .collect(),
            tool_uses: Vec::new(),
            output: String::new(),
            previous_response_id: opts.previous_response_id.clone(),
        };

        let tools = self.registry.definitions().await;

        // Fresh conversations pull recalled context; continuations rely on
        // the provider-side chain.
        if opts.previous_response_id.is_none() {
            if let Some(ref memory) = self.memory {
                match memory.recall(&state).await {
                    Ok(recalled) => state.context.extend(recalled.context),
                    Err(e) => warn!("memory recall failed: {}", e),
                }
            }
        }

        let mut last_response_id = None;
        let mut prompt_count = 0;

        while prompt_count < MAX_PROMPTS {
            prompt_count += 1;

            let turn = self
                .llm
                .prompt(&state, &tools, opts.on_progress.clone())
                .await?;
            last_response_id = turn.response_id.clone();

            match turn.function_call {
                Some(call) => {
                    debug!(tool = %call.name, "function call requested");
                    let args = parse_arguments(&call.arguments);

                    let notice = if turn.output_text.is_empty() {
                        format!("Using ability - {}\n\n", call.name)
                    } else {
                        turn.output_text.clone()
                    };
                    if let Some(ref sink) = opts.on_progress {
                        sink(&notice);
                    }

                    let result = self
                        .execute_call(&call.name, args, opts.on_progress.clone())
                        .await;

                    let output = serde_json::to_string(&result)
                        .unwrap_or_else(|_| result.to_string());
                    state.tool_uses.push((
                        call.clone(),
                        FunctionCallOutput {
                            call_id: call.call_id.clone(),
                            output,
                        },
                    ));
                    self.persist(&state).await;
                }
                None => {
                    state.output = turn.output_text;
                    self.persist(&state).await;
                    break;
                }
            }
        }

        state.previous_response_id = last_response_id;
        Ok(state)
    }

    /// Sign the arguments and route the call through the registry. Failures
    /// come back as string values and flow into the conversation like any
    /// other result.
    async fn execute_call(
        &self,
        tool_id: &str,
        mut args: Map<String, Value>,
        on_progress: Option<ProgressSink>,
    ) -> Value {
        match self
            .signer
            .sign_args(&args)
            .and_then(|proof| Ok(serde_json::to_value(&proof)?))
        {
            Ok(proof_value) => {
                args.insert("auth".to_string(), proof_value);
            }
            Err(e) => warn!("could not sign tool arguments: {}", e),
        }

        self.registry.call_tool(tool_id, args, on_progress).await
    }

    async fn persist(&self, state: &AgentPromptState) {
        if let Some(ref memory) = self.memory {
            if let Err(e) = memory.create(state).await {
                warn!("memory create failed: {}", e);
            }
        }
    }
}

/// Merge a provider `arguments` string into one object.
///
/// Providers occasionally emit several back-to-back JSON objects as one
/// string; fragments are merged key-wise with later fragments overriding
/// earlier ones. Undecodable trailing content is discarded.
pub fn parse_arguments(raw: &str) -> Map<String, Value> {
    let mut merged = Map::new();

    for fragment in serde_json::Deserializer::from_str(raw).into_iter::<Value>() {
        match fragment {
            Ok(Value::Object(object)) => {
                for (key, value) in object {
                    merged.insert(key, value);
                }
            }
            Ok(other) => {
                debug!("ignoring non-object argument fragment: {}", other);
            }
            Err(e) => {
                debug!("discarding undecodable argument fragment: {}", e);
                break;
            }
        }
    }

    merged
}
