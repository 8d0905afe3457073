use super::{ByteStream, LinePlatform, PlatformError, ReplyPayload};
use crate::config::{LINE_API_BASE, LINE_DATA_API_BASE};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::{Client as HttpClient, Response};
use serde_json::{json, Value};
use tracing::debug;

/// Longest error body kept in a `PlatformError::Api`
const MAX_ERROR_BODY_CHARS: usize = 500;

/// HTTP client for the LINE Messaging API
pub struct LineClient {
    http: HttpClient,
    channel_access_token: String,
    api_base: String,
    data_api_base: String,
}

impl LineClient {
    /// Create a client authenticated with a channel access token
    #[must_use]
    pub fn new(channel_access_token: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            channel_access_token: channel_access_token.into(),
            api_base: LINE_API_BASE.to_string(),
            data_api_base: LINE_DATA_API_BASE.to_string(),
        }
    }

    /// Point the client at different API hosts
    #[must_use]
    pub fn with_api_bases(mut self, api_base: &str, data_api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.data_api_base = data_api_base.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LinePlatform for LineClient {
    async fn get_message_content(&self, message_id: &str) -> Result<ByteStream, PlatformError> {
        let url = format!("{}/v2/bot/message/{message_id}/content", self.data_api_base);
        debug!(message_id, "Opening message content stream");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.channel_access_token)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;
        let response = ensure_success(response).await?;

        Ok(response
            .bytes_stream()
            .map_err(|e| PlatformError::Network(e.to_string()))
            .boxed())
    }

    async fn reply_message(
        &self,
        reply_token: &str,
        messages: Vec<ReplyPayload>,
    ) -> Result<Value, PlatformError> {
        let url = format!("{}/v2/bot/message/reply", self.api_base);
        let body = json!({
            "replyToken": reply_token,
            "messages": messages,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.channel_access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;
        let response = ensure_success(response).await?;

        response
            .json()
            .await
            .map_err(|e| PlatformError::Json(e.to_string()))
    }
}

async fn ensure_success(response: Response) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    Err(PlatformError::Api {
        status: status.as_u16(),
        message: clean_error_body(&error_text),
    })
}

/// Strip HTML error pages and truncate long bodies
fn clean_error_body(error_text: &str) -> String {
    let trimmed = error_text.trim_start();
    let is_html = trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<HTML");

    if is_html {
        return "server returned an HTML error page".to_string();
    }

    if error_text.chars().count() > MAX_ERROR_BODY_CHARS {
        let truncated: String = error_text.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{truncated}... (truncated)")
    } else {
        error_text.to_string()
    }
}
