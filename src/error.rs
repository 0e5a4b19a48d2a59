//! Armature Error Taxonomy
//!
//! One error type for the whole tool-calling path. The connection manager
//! inspects `is_timeout` to decide whether a failed call is retryable;
//! everything else is surfaced to the agent loop as descriptive text.

use thiserror::Error;

use crate::rpc::RPC_TIMEOUT_CODE;

pub type Result<T> = std::result::Result<T, ArmatureError>;

#[derive(Error, Debug)]
pub enum ArmatureError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("invalid arguments: {0}")]
    Validation(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl ArmatureError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        ArmatureError::MalformedMessage(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ArmatureError::Validation(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        ArmatureError::Auth(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ArmatureError::Internal(msg.into())
    }

    /// Whether this error is timeout-class and therefore worth retrying.
    ///
    /// Covers local deadline expiry, the JSON-RPC timeout code relayed by a
    /// remote server, and reqwest-level socket timeouts.
    pub fn is_timeout(&self) -> bool {
        match self {
            ArmatureError::Timeout => true,
            ArmatureError::Rpc { code, .. } => *code == RPC_TIMEOUT_CODE,
            ArmatureError::Network(e) => e.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        assert!(ArmatureError::Timeout.is_timeout());
        assert!(ArmatureError::Rpc {
            code: RPC_TIMEOUT_CODE,
            message: "timed out".to_string()
        }
        .is_timeout());
        assert!(!ArmatureError::Rpc {
            code: -32602,
            message: "bad params".to_string()
        }
        .is_timeout());
        assert!(!ArmatureError::auth("nope").is_timeout());
    }
}
