//! HTTP Request/Response Carrier
//!
//! One POST per message with a synchronous JSON reply. When constructed
//! with a signing identity, `tools/call` requests carry a did:key bearer
//! token in the Authorization header.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use crate::auth::AgentSigner;
use crate::error::{ArmatureError, Result};
use crate::rpc::{RpcMessage, METHOD_CALL_TOOL};
use crate::transport::Transport;

pub struct HttpClientTransport {
    url: String,
    signer: Option<Arc<AgentSigner>>,
    http: Client,
}

impl HttpClientTransport {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            signer: None,
            http: Client::new(),
        }
    }

    /// A carrier that authenticates `tools/call` requests with a bearer
    /// token issued for this endpoint.
    pub fn with_signer(url: &str, signer: Arc<AgentSigner>) -> Self {
        Self {
            url: url.to_string(),
            signer: Some(signer),
            http: Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpClientTransport {
    async fn send(&self, message: &RpcMessage) -> Result<Option<RpcMessage>> {
        // Notifications are delivered and forgotten: no reply is awaited
        // and delivery status is not surfaced.
        if message.is_notification() {
            let _ = self
                .http
                .post(&self.url)
                .header("content-type", "application/json")
                .json(message)
                .send()
                .await;
            return Ok(None);
        }

        let mut request = self
            .http
            .post(&self.url)
            .header("content-type", "application/json")
            .json(message);

        if let (Some(signer), RpcMessage::Request(req)) = (&self.signer, message) {
            if req.method == METHOD_CALL_TOOL {
                let token = signer.bearer_jwt(&self.url)?;
                request = request.header("authorization", format!("Bearer {}", token));
            }
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArmatureError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.contains("application/json") {
            return Ok(None);
        }

        let value: serde_json::Value = response.json().await?;
        RpcMessage::parse(value).map(Some)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
