//! LINE Messaging API collaborator
//!
//! Webhook event types, reply payloads, signature verification and the HTTP
//! client used to stream message content and send replies.

mod client;
/// Reply message objects
pub mod payload;
/// Webhook signature verification
pub mod signature;
/// Inbound webhook event types
pub mod types;

pub use client::LineClient;
pub use payload::ReplyPayload;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

/// Streamed message content
pub type ByteStream = BoxStream<'static, Result<Bytes, PlatformError>>;

/// Errors returned by the LINE platform
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Non-success HTTP status from the API
    #[error("LINE API error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Cleaned error body
        message: String,
    },
    /// Error during network communication or while streaming a body
    #[error("Network error: {0}")]
    Network(String),
    /// Error decoding a response body
    #[error("JSON error: {0}")]
    Json(String),
}

/// Operations the bot needs from the messaging platform
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LinePlatform: Send + Sync {
    /// Open the content stream of a message stored on the platform
    async fn get_message_content(&self, message_id: &str) -> Result<ByteStream, PlatformError>;

    /// Reply to an event; the token is single-use
    async fn reply_message(
        &self,
        reply_token: &str,
        messages: Vec<ReplyPayload>,
    ) -> Result<Value, PlatformError>;
}
