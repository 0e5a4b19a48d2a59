//! Server-Side Tools
//!
//! The trait every hosted tool implements, plus the echo tool used by the
//! demo binary. Business tools validate nothing themselves: dispatch has
//! already schema-checked and auth-checked the arguments they receive.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::payment::PaymentDetails;
use crate::schema::{FieldType, ToolSchema};

/// A named, schema-described function hosted by a tool server.
#[async_trait]
pub trait ServerTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> ToolSchema;

    /// Present on gated tools only; a tool without payment details never
    /// requires an auth proof.
    fn payment_details(&self) -> Option<PaymentDetails> {
        None
    }

    /// Run the tool body against validated arguments. A string result is
    /// sent verbatim; any other value is JSON-encoded.
    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value>;
}

/// Echoes its validated arguments back to the caller, optionally behind a
/// payment gate.
pub struct EchoTool {
    name: String,
    payment: Option<PaymentDetails>,
}

impl EchoTool {
    pub fn free(name: &str) -> Self {
        Self {
            name: name.to_string(),
            payment: None,
        }
    }

    pub fn gated(name: &str, payment: PaymentDetails) -> Self {
        Self {
            name: name.to_string(),
            payment: Some(payment),
        }
    }
}

#[async_trait]
impl ServerTool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Echoes input"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new().field("message", FieldType::String, "Text to echo back")
    }

    fn payment_details(&self) -> Option<PaymentDetails> {
        self.payment.clone()
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        Ok(json!({ "echoed": args }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_roundtrip() {
        let tool = EchoTool::free("echo");
        let mut args = Map::new();
        args.insert("message".to_string(), json!("hi"));
        let result = tool.execute(args).await.unwrap();
        assert_eq!(result["echoed"]["message"], "hi");
    }
}
