use super::media::FetchError;
use super::transcode::TranscodeError;
use crate::line::PlatformError;
use crate::llm::LlmError;
use thiserror::Error;

/// Errors that fail the handling of an event, and with it the whole batch
#[derive(Debug, Error)]
pub enum BotError {
    /// The event `type` is not one the bot handles
    #[error("Unknown event: {0}")]
    UnknownEvent(String),
    /// The `message.type` is not one the bot handles
    #[error("Unknown message: {0}")]
    UnknownMessage(String),
    /// A replying event arrived without a reply token
    #[error("{0} event has no reply token")]
    MissingReplyToken(&'static str),
    /// A message ID that cannot name an artifact file
    #[error("Invalid message id: {0}")]
    InvalidMessageId(String),
    /// Completion service failure
    #[error(transparent)]
    Completion(#[from] LlmError),
    /// Reply transport failure
    #[error(transparent)]
    Platform(#[from] PlatformError),
    /// Content download failure
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Preview generation failure
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    /// The task running an event panicked
    #[error("Event task failed: {0}")]
    Task(String),
}
