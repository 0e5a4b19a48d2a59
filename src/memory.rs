//! Memory Store Client
//!
//! HTTP implementation of the `MemoryStore` seam. The store itself is an
//! external collaborator; this client just POSTs the prompt lifecycle to
//! its recall and create endpoints.

use async_trait::async_trait;
use reqwest::Client;

use crate::types::{AgentPromptState, MemoryStore, RecallResult};

pub struct HttpMemoryStore {
    base_url: String,
    http: Client,
}

impl HttpMemoryStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }
}

#[async_trait]
impl MemoryStore for HttpMemoryStore {
    async fn recall(&self, state: &AgentPromptState) -> anyhow::Result<RecallResult> {
        let response = self
            .http
            .post(format!("{}/recall-memory", self.base_url))
            .header("Content-Type", "application/json")
            .json(state)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to recall memory: {}", response.status());
        }

        Ok(response.json().await?)
    }

    async fn create(&self, state: &AgentPromptState) -> anyhow::Result<AgentPromptState> {
        let response = self
            .http
            .post(format!("{}/create-memory", self.base_url))
            .header("Content-Type", "application/json")
            .json(state)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to create memory: {}", response.status());
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let store = HttpMemoryStore::new("http://localhost:9999/");
        assert_eq!(store.base_url, "http://localhost:9999");
    }
}
