//! Event dispatcher
//!
//! Routes each webhook event to its handler. Events of one batch run as
//! independent tasks; the batch fails if any of them fails.

use super::error::BotError;
use super::handlers::{self, BotContext};
use crate::line::types::{Event, EventKind, Message, MessageContent, Postback};
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

/// Result of handling one event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DispatchOutcome {
    /// A reply was sent; holds the platform's response body
    Replied(Value),
    /// Nothing was sent (verification ping, unfollow, leave)
    Skipped,
}

/// Routes events to handlers
#[derive(Clone)]
pub struct Dispatcher {
    ctx: BotContext,
}

/// Verification pings carry a reply token of one repeated character
#[must_use]
pub fn is_connectivity_test(reply_token: &str) -> bool {
    let mut chars = reply_token.chars();
    chars
        .next()
        .is_some_and(|first| chars.all(|c| c == first))
}

/// Parse a raw event, classifying failures by the declared kind
///
/// # Errors
///
/// Returns `BotError::UnknownMessage` for message events whose message does
/// not parse and `BotError::UnknownEvent` for everything else.
pub fn parse_event(raw: &Value) -> Result<Event, BotError> {
    serde_json::from_value(raw.clone()).map_err(|e| {
        debug!(error = %e, "Event did not match any known shape");
        if raw.get("type").and_then(Value::as_str) == Some("message") {
            let message = raw.get("message").unwrap_or(&Value::Null);
            BotError::UnknownMessage(message.to_string())
        } else {
            BotError::UnknownEvent(raw.to_string())
        }
    })
}

fn postback_reply(postback: &Postback) -> String {
    let mut data = postback.data.clone();
    if matches!(data.as_str(), "DATE" | "TIME" | "DATETIME") {
        let params = postback.params.as_ref().unwrap_or(&Value::Null);
        data.push_str(&format!("({params})"));
    }
    format!("Got postback: {data}")
}

fn require_token(reply_token: Option<String>, kind: &'static str) -> Result<String, BotError> {
    reply_token
        .filter(|token| !token.is_empty())
        .ok_or(BotError::MissingReplyToken(kind))
}

impl Dispatcher {
    /// Create a dispatcher over the handler context
    #[must_use]
    pub const fn new(ctx: BotContext) -> Self {
        Self { ctx }
    }

    /// Dispatch one raw webhook event.
    ///
    /// Verification pings are recognised before the event is parsed.
    ///
    /// # Errors
    ///
    /// Returns the parse or handler error of the event.
    pub async fn dispatch_raw(&self, raw: Value) -> Result<DispatchOutcome, BotError> {
        if let Some(token) = raw.get("replyToken").and_then(Value::as_str) {
            if is_connectivity_test(token) {
                let message = raw.get("message").unwrap_or(&Value::Null);
                info!(message = %message, "Test hook received");
                return Ok(DispatchOutcome::Skipped);
            }
        }

        let event = parse_event(&raw)?;
        self.dispatch(event).await
    }

    /// Dispatch one parsed event
    ///
    /// # Errors
    ///
    /// Returns the handler's error, or `BotError::MissingReplyToken` when a
    /// replying event has no token.
    pub async fn dispatch(&self, event: Event) -> Result<DispatchOutcome, BotError> {
        if event
            .reply_token
            .as_deref()
            .is_some_and(is_connectivity_test)
        {
            info!("Test hook received");
            return Ok(DispatchOutcome::Skipped);
        }

        let Event {
            reply_token,
            source,
            kind,
        } = event;

        let reply = match kind {
            EventKind::Message { message } => {
                let token = require_token(reply_token, "message")?;
                self.dispatch_message(&token, message).await?
            }
            EventKind::Follow => {
                let token = require_token(reply_token, "follow")?;
                handlers::reply_text(&self.ctx, &token, "Got followed event").await?
            }
            EventKind::Unfollow => {
                info!(?source, "Unfollowed this bot");
                return Ok(DispatchOutcome::Skipped);
            }
            EventKind::Join => {
                let token = require_token(reply_token, "join")?;
                let text = format!("Joined {}", source.kind());
                handlers::reply_text(&self.ctx, &token, &text).await?
            }
            EventKind::Leave => {
                info!(?source, "Left");
                return Ok(DispatchOutcome::Skipped);
            }
            EventKind::Postback { postback } => {
                let token = require_token(reply_token, "postback")?;
                handlers::reply_text(&self.ctx, &token, &postback_reply(&postback)).await?
            }
            EventKind::Beacon { beacon } => {
                let token = require_token(reply_token, "beacon")?;
                let text = format!("Got beacon: {}", beacon.hwid);
                handlers::reply_text(&self.ctx, &token, &text).await?
            }
        };

        Ok(DispatchOutcome::Replied(reply))
    }

    async fn dispatch_message(&self, reply_token: &str, message: Message) -> Result<Value, BotError> {
        let ctx = &self.ctx;
        let id = message.id.as_str();

        match &message.content {
            MessageContent::Text { text } => handlers::handle_text(ctx, reply_token, text).await,
            MessageContent::Image { content_provider } => {
                handlers::handle_image(ctx, reply_token, id, content_provider).await
            }
            MessageContent::Video { content_provider } => {
                handlers::handle_video(ctx, reply_token, id, content_provider).await
            }
            MessageContent::Audio {
                content_provider,
                duration,
            } => handlers::handle_audio(ctx, reply_token, id, content_provider, *duration).await,
            MessageContent::Location {
                title,
                address,
                latitude,
                longitude,
            } => {
                handlers::handle_location(ctx, reply_token, title, address, *latitude, *longitude)
                    .await
            }
            MessageContent::Sticker {
                package_id,
                sticker_id,
            } => handlers::handle_sticker(ctx, reply_token, package_id, sticker_id).await,
        }
    }

    /// Dispatch a batch of raw events concurrently.
    ///
    /// Every event runs to completion on its own task. Outcomes are returned
    /// in event order; if any event failed, the first failure in event order
    /// is returned instead and the other events' replies stand.
    ///
    /// # Errors
    ///
    /// Returns the first event's error.
    pub async fn dispatch_batch(&self, events: Vec<Value>) -> Result<Vec<DispatchOutcome>, BotError> {
        let tasks: Vec<_> = events
            .into_iter()
            .map(|raw| {
                let dispatcher = self.clone();
                tokio::spawn(async move { dispatcher.dispatch_raw(raw).await })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        let mut first_error = None;

        for (index, joined) in join_all(tasks).await.into_iter().enumerate() {
            let result = joined.unwrap_or_else(|e| Err(BotError::Task(e.to_string())));
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(event_index = index, error = %e, "Event handling failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }
}
