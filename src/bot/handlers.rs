//! Message and event handlers
//!
//! Every handler builds exactly one reply and hands it to the platform.

use super::artifacts::ArtifactStore;
use super::error::BotError;
use super::media::ContentFetcher;
use super::transcode::{run_transcoder, TranscodeMode, Transcoder};
use crate::line::types::ContentProvider;
use crate::line::{LinePlatform, ReplyPayload};
use crate::llm::CompletionProvider;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Collaborators shared by all handlers
#[derive(Clone)]
pub struct BotContext {
    /// Platform client (content and replies)
    pub platform: Arc<dyn LinePlatform>,
    /// Completion service
    pub completion: Arc<dyn CompletionProvider>,
    /// Preview generator
    pub transcoder: Arc<dyn Transcoder>,
    /// Artifact layout and public URLs
    pub artifacts: Arc<ArtifactStore>,
    /// Content downloader
    pub fetcher: ContentFetcher,
    /// Completion output bound
    pub max_tokens: u32,
}

impl BotContext {
    /// Assemble a context; the fetcher shares the platform client
    #[must_use]
    pub fn new(
        platform: Arc<dyn LinePlatform>,
        completion: Arc<dyn CompletionProvider>,
        transcoder: Arc<dyn Transcoder>,
        artifacts: ArtifactStore,
        max_tokens: u32,
    ) -> Self {
        Self {
            fetcher: ContentFetcher::new(Arc::clone(&platform)),
            platform,
            completion,
            transcoder,
            artifacts: Arc::new(artifacts),
            max_tokens,
        }
    }

    async fn reply(&self, reply_token: &str, payload: ReplyPayload) -> Result<Value, BotError> {
        Ok(self.platform.reply_message(reply_token, vec![payload]).await?)
    }
}

/// Media kinds that may need downloading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Image, stored as `.jpg`
    Image,
    /// Video, stored as `.mp4`
    Video,
    /// Audio, stored as `.m4a`
    Audio,
}

impl MediaKind {
    /// File extension of the downloaded original
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Image => "jpg",
            Self::Video => "mp4",
            Self::Audio => "m4a",
        }
    }

    /// How the preview is derived, if there is one
    #[must_use]
    pub const fn preview_mode(self) -> Option<TranscodeMode> {
        match self {
            Self::Image => Some(TranscodeMode::ImagePreview),
            Self::Video => Some(TranscodeMode::VideoFrame),
            Self::Audio => None,
        }
    }
}

/// Public URLs of a media message
#[derive(Debug, Clone, PartialEq, Eq)]
struct MediaUrls {
    original: String,
    preview: Option<String>,
}

/// Reply with a plain text message
///
/// # Errors
///
/// Returns `BotError::Platform` if the reply fails.
pub async fn reply_text(ctx: &BotContext, reply_token: &str, text: &str) -> Result<Value, BotError> {
    ctx.reply(reply_token, ReplyPayload::text(text)).await
}

/// Forward the text to the completion service and reply with the answer
///
/// # Errors
///
/// Completion and reply failures propagate unchanged.
pub async fn handle_text(ctx: &BotContext, reply_token: &str, text: &str) -> Result<Value, BotError> {
    let completion = ctx.completion.complete(text, ctx.max_tokens).await?;
    let message = completion.trim();
    info!(completion = %message, "Completion received");

    ctx.reply(reply_token, ReplyPayload::text(message)).await
}

/// Echo an image back, downloading and previewing managed content
///
/// # Errors
///
/// Download, transcode and reply failures propagate unchanged.
pub async fn handle_image(
    ctx: &BotContext,
    reply_token: &str,
    message_id: &str,
    provider: &ContentProvider,
) -> Result<Value, BotError> {
    let urls = resolve_media(ctx, message_id, MediaKind::Image, provider).await?;
    info!(
        original_content_url = %urls.original,
        preview_image_url = ?urls.preview,
        "Image content resolved"
    );

    let payload = ReplyPayload::Image {
        preview_image_url: urls.preview.unwrap_or_else(|| urls.original.clone()),
        original_content_url: urls.original,
    };
    ctx.reply(reply_token, payload).await
}

/// Echo a video back, downloading it and extracting a still frame when managed
///
/// # Errors
///
/// Download, transcode and reply failures propagate unchanged.
pub async fn handle_video(
    ctx: &BotContext,
    reply_token: &str,
    message_id: &str,
    provider: &ContentProvider,
) -> Result<Value, BotError> {
    let urls = resolve_media(ctx, message_id, MediaKind::Video, provider).await?;

    let payload = ReplyPayload::Video {
        preview_image_url: urls.preview.unwrap_or_else(|| urls.original.clone()),
        original_content_url: urls.original,
    };
    ctx.reply(reply_token, payload).await
}

/// Echo an audio clip back with its declared duration
///
/// # Errors
///
/// Download and reply failures propagate unchanged.
pub async fn handle_audio(
    ctx: &BotContext,
    reply_token: &str,
    message_id: &str,
    provider: &ContentProvider,
    duration: u64,
) -> Result<Value, BotError> {
    let urls = resolve_media(ctx, message_id, MediaKind::Audio, provider).await?;

    let payload = ReplyPayload::Audio {
        original_content_url: urls.original,
        duration,
    };
    ctx.reply(reply_token, payload).await
}

/// Echo a location back
///
/// # Errors
///
/// Returns `BotError::Platform` if the reply fails.
pub async fn handle_location(
    ctx: &BotContext,
    reply_token: &str,
    title: &str,
    address: &str,
    latitude: f64,
    longitude: f64,
) -> Result<Value, BotError> {
    let payload = ReplyPayload::Location {
        title: title.to_string(),
        address: address.to_string(),
        latitude,
        longitude,
    };
    ctx.reply(reply_token, payload).await
}

/// Echo a sticker back
///
/// # Errors
///
/// Returns `BotError::Platform` if the reply fails.
pub async fn handle_sticker(
    ctx: &BotContext,
    reply_token: &str,
    package_id: &str,
    sticker_id: &str,
) -> Result<Value, BotError> {
    let payload = ReplyPayload::Sticker {
        package_id: package_id.to_string(),
        sticker_id: sticker_id.to_string(),
    };
    ctx.reply(reply_token, payload).await
}

async fn resolve_media(
    ctx: &BotContext,
    message_id: &str,
    kind: MediaKind,
    provider: &ContentProvider,
) -> Result<MediaUrls, BotError> {
    match provider {
        ContentProvider::External {
            original_content_url,
            preview_image_url,
        } => Ok(MediaUrls {
            original: original_content_url.clone(),
            preview: preview_image_url.clone(),
        }),
        ContentProvider::Managed => {
            if !ArtifactStore::is_valid_id(message_id) {
                return Err(BotError::InvalidMessageId(message_id.to_string()));
            }
            let download_path = ctx.artifacts.original_path(message_id, kind.extension());
            let download_path = ctx.fetcher.fetch(message_id, &download_path).await?;

            let preview = match kind.preview_mode() {
                Some(mode) => {
                    let preview_path = ctx.artifacts.preview_path(message_id);
                    run_transcoder(
                        Arc::clone(&ctx.transcoder),
                        download_path.clone(),
                        preview_path.clone(),
                        mode,
                    )
                    .await?;
                    Some(ctx.artifacts.public_url(&preview_path))
                }
                None => None,
            };

            Ok(MediaUrls {
                original: ctx.artifacts.public_url(&download_path),
                preview,
            })
        }
    }
}
