//! Message Transports
//!
//! Carriers move RPC messages between two parties without assuming either
//! is directly reachable: an HTTP request/response carrier for the client
//! side, and a server-push streaming channel with per-session reverse POST
//! delivery for the server side.

pub mod http;
pub mod sse;

use async_trait::async_trait;

use crate::error::Result;
use crate::rpc::RpcMessage;

/// The abstract carrier contract: send a message, receive zero or one
/// correlated replies.
///
/// Notifications resolve immediately with no reply; requests resolve to
/// exactly one response or fail with a transport error.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &RpcMessage) -> Result<Option<RpcMessage>>;

    /// Release any resources held by the carrier. Safe to call more than
    /// once.
    async fn close(&self) -> Result<()>;
}
