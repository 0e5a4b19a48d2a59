//! LLM Provider Client
//!
//! An OpenAI-compatible chat-completions implementation of the `LlmClient`
//! seam. The tool `name` handed to the provider is the registry id, so a
//! returned function call maps straight back to a definition.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::types::{
    AgentPromptState, FunctionCall, LlmClient, LlmTurn, ModelConfig, ProgressSink,
    ToolDefinition,
};

const SYSTEM_PROMPT: &str = "\
You are a tool-using AI agent. Each interaction provides your identity, \
relevant context, the user's message, and the tools you may call.

Stay true to your identity and weave recalled context in naturally, without \
mentioning that you are reading from memory. Use a tool only when it \
genuinely helps, follow any instructions in its description carefully, and \
tell the user when you are using one. If a tool fails, try to recover with \
the information you have or ask the user for what is missing. Never invent \
facts you do not know. Keep responses concise.";

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct LlmHttpClient {
    config: ModelConfig,
    http: Client,
}

impl LlmHttpClient {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }
}

#[async_trait]
impl LlmClient for LlmHttpClient {
    /// Send one prompt round-trip.
    ///
    /// This implementation does not stream; when a sink is supplied the
    /// final text is emitted through it once, which resolves to the same
    /// structured result streaming would.
    async fn prompt(
        &self,
        state: &AgentPromptState,
        tools: &[ToolDefinition],
        on_chunk: Option<ProgressSink>,
    ) -> anyhow::Result<LlmTurn> {
        let mut body = json!({
            "model": self.config.model,
            "messages": build_messages(state),
        });

        if let Some(temperature) = self.config.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(tool_to_function).collect());
            body["tool_choice"] = json!("auto");
        }

        let url = format!("{}/chat/completions", self.config.endpoint);
        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM error: {}: {}", status.as_u16(), text);
        }

        let data: Value = response.json().await?;

        let choice = data["choices"]
            .get(0)
            .ok_or_else(|| anyhow::anyhow!("no completion choice returned"))?;
        let message = &choice["message"];

        let output_text = message["content"].as_str().unwrap_or("").to_string();

        let function_call = message["tool_calls"]
            .as_array()
            .and_then(|calls| calls.first())
            .map(|tc| FunctionCall {
                name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                call_id: tc["id"].as_str().unwrap_or("").to_string(),
                arguments: tc["function"]["arguments"]
                    .as_str()
                    .unwrap_or("{}")
                    .to_string(),
            });

        if let Some(ref sink) = on_chunk {
            if !output_text.is_empty() {
                sink(&output_text);
            }
        }

        Ok(LlmTurn {
            output_text,
            function_call,
            response_id: data["id"].as_str().map(|s| s.to_string()),
        })
    }
}

/// Assemble the message sequence for one round-trip: instructions, recalled
/// context, the user message, then each earlier (call, result) pair.
fn build_messages(state: &AgentPromptState) -> Vec<Value> {
    let instructions = format!(
        "{}\n\n<Your Name>\n{}\n</Your Name>\n\n<Your Identity>\n{}\n</Your Identity>",
        SYSTEM_PROMPT, state.agent_name, state.identity_prompt
    );

    let mut messages = vec![json!({ "role": "system", "content": instructions })];

    if !state.context.is_empty() {
        messages.push(json!({
            "role": "assistant",
            "content": format!(
                "<AdditionalContext>\n{}\n</AdditionalContext>",
                state.context.join("\n")
            ),
        }));
    }

    messages.push(json!({ "role": "user", "content": state.message }));

    for (call, output) in &state.tool_uses {
        messages.push(json!({
            "role": "assistant",
            "content": "",
            "tool_calls": [{
                "id": call.call_id,
                "type": "function",
                "function": { "name": call.name, "arguments": call.arguments },
            }],
        }));
        messages.push(json!({
            "role": "tool",
            "tool_call_id": output.call_id,
            "content": output.output,
        }));
    }

    messages
}

fn tool_to_function(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.id,
            "description": tool.description,
            "parameters": tool.input_schema.to_json_schema(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, ToolSchema};

    fn sample_state() -> AgentPromptState {
        AgentPromptState {
            agent_identity: "z6Mk-example".to_string(),
            agent_name: "tester".to_string(),
            message_id: "m-1".to_string(),
            message: "hello".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            channel_id: None,
            identity_prompt: "A test agent.".to_string(),
            context: vec!["user likes brevity".to_string()],
            tool_uses: vec![(
                FunctionCall {
                    name: "abc123_echo".to_string(),
                    call_id: "call-1".to_string(),
                    arguments: r#"{"message":"hi"}"#.to_string(),
                },
                crate::types::FunctionCallOutput {
                    call_id: "call-1".to_string(),
                    output: r#"{"echoed":{"message":"hi"}}"#.to_string(),
                },
            )],
            output: String::new(),
            previous_response_id: None,
        }
    }

    #[test]
    fn test_build_messages_shape() {
        let messages = build_messages(&sample_state());
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0]["role"], "system");
        assert!(messages[1]["content"]
            .as_str()
            .unwrap()
            .contains("AdditionalContext"));
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[3]["tool_calls"][0]["id"], "call-1");
        assert_eq!(messages[4]["role"], "tool");
        assert_eq!(messages[4]["tool_call_id"], "call-1");
    }

    #[test]
    fn test_tool_function_uses_registry_id() {
        let tool = ToolDefinition {
            id: "abc123_echo".to_string(),
            name: "echo".to_string(),
            description: "Echoes input".to_string(),
            input_schema: ToolSchema::new().field("message", FieldType::String, ""),
            server_address: "http://localhost:1/rpc".to_string(),
            payment_details: None,
        };
        let function = tool_to_function(&tool);
        assert_eq!(function["function"]["name"], "abc123_echo");
        assert_eq!(
            function["function"]["parameters"]["properties"]["message"]["type"],
            "string"
        );
    }
}
