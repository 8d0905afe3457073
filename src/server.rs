//! Webhook ingress and static file serving

use crate::bot::{BotError, DispatchOutcome, Dispatcher};
use crate::config::{DOWNLOADED_PREFIX, LINE_SIGNATURE_HEADER, STATIC_PREFIX};
use crate::line::signature::verify_signature;
use crate::line::types::WebhookBody;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared state of the webhook routes
#[derive(Clone)]
pub struct AppState {
    dispatcher: Dispatcher,
    channel_secret: Arc<str>,
}

impl AppState {
    /// Bundle the dispatcher with the signature key
    #[must_use]
    pub fn new(dispatcher: Dispatcher, channel_secret: &str) -> Self {
        Self {
            dispatcher,
            channel_secret: Arc::from(channel_secret),
        }
    }
}

/// Reasons a webhook call is rejected
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No signature header
    #[error("missing x-line-signature header")]
    MissingSignature,
    /// Signature does not match the body
    #[error("signature validation failed")]
    InvalidSignature,
    /// Body is not a webhook payload
    #[error("malformed webhook body: {0}")]
    MalformedBody(String),
    /// An event of the batch failed
    #[error("batch failed: {0}")]
    Batch(#[from] BotError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::MissingSignature | Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::MalformedBody(_) | Self::Batch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        match &self {
            Self::Batch(_) | Self::MalformedBody(_) => error!(error = %self, "Webhook failed"),
            Self::MissingSignature | Self::InvalidSignature => {
                warn!(error = %self, "Webhook rejected");
            }
        }
        status.into_response()
    }
}

/// Build the router: `/webhook`, `/static` and `/downloaded`
pub fn create_router(state: AppState, static_dir: &Path, downloaded_dir: &Path) -> Router {
    Router::new()
        .route("/webhook", get(webhook_probe).post(webhook))
        .nest_service(STATIC_PREFIX, ServeDir::new(static_dir))
        .nest_service(DOWNLOADED_PREFIX, ServeDir::new(downloaded_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn webhook_probe() -> &'static str {
    "I'm listening. Please access with POST."
}

async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<DispatchOutcome>>, WebhookError> {
    let signature = headers
        .get(LINE_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;
    if !verify_signature(&state.channel_secret, &body, signature) {
        return Err(WebhookError::InvalidSignature);
    }

    let payload: WebhookBody =
        serde_json::from_slice(&body).map_err(|e| WebhookError::MalformedBody(e.to_string()))?;

    if let Some(destination) = &payload.destination {
        info!(destination = %destination, "Destination User ID");
    }

    let Value::Array(events) = payload.events else {
        return Err(WebhookError::MalformedBody(
            "events is not an array".to_string(),
        ));
    };

    let outcomes = state.dispatcher.dispatch_batch(events).await?;
    Ok(Json(outcomes))
}
