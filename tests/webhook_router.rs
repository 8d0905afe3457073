use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures_util::StreamExt;
use http_body_util::BodyExt;
use oxide_line_bot::bot::artifacts::ArtifactStore;
use oxide_line_bot::bot::transcode::{TranscodeError, TranscodeMode, Transcoder};
use oxide_line_bot::bot::{BotContext, Dispatcher};
use oxide_line_bot::line::signature::compute_signature;
use oxide_line_bot::line::{ByteStream, LinePlatform, PlatformError, ReplyPayload};
use oxide_line_bot::llm::{CompletionProvider, LlmError};
use oxide_line_bot::server::{create_router, AppState};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "test-channel-secret";

type Replies = Arc<Mutex<Vec<(String, Vec<ReplyPayload>)>>>;

struct FakePlatform {
    replies: Replies,
}

#[async_trait]
impl LinePlatform for FakePlatform {
    async fn get_message_content(&self, _message_id: &str) -> Result<ByteStream, PlatformError> {
        let chunks = vec![Ok(bytes::Bytes::from_static(b"content"))];
        Ok(futures_util::stream::iter(chunks).boxed())
    }

    async fn reply_message(
        &self,
        reply_token: &str,
        messages: Vec<ReplyPayload>,
    ) -> Result<Value, PlatformError> {
        if reply_token == "expired-token" {
            return Err(PlatformError::Api {
                status: 400,
                message: "Invalid reply token".to_string(),
            });
        }
        if let Ok(mut replies) = self.replies.lock() {
            replies.push((reply_token.to_string(), messages));
        }
        Ok(json!({"sentMessages": [{"id": "1"}]}))
    }
}

struct UppercaseCompletion;

#[async_trait]
impl CompletionProvider for UppercaseCompletion {
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String, LlmError> {
        Ok(format!("  {}\n", prompt.to_uppercase()))
    }
}

struct CopyTranscoder;

impl Transcoder for CopyTranscoder {
    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        _mode: TranscodeMode,
    ) -> Result<(), TranscodeError> {
        std::fs::copy(input, output)
            .map(|_| ())
            .map_err(|source| TranscodeError::Spawn {
                program: "copy".to_string(),
                source,
            })
    }
}

struct Harness {
    router: Router,
    replies: Replies,
    downloaded: TempDir,
    _static: TempDir,
}

fn harness() -> Result<Harness, std::io::Error> {
    let downloaded = tempfile::tempdir()?;
    let static_dir = tempfile::tempdir()?;
    let replies = Replies::default();

    let ctx = BotContext::new(
        Arc::new(FakePlatform {
            replies: Arc::clone(&replies),
        }),
        Arc::new(UppercaseCompletion),
        Arc::new(CopyTranscoder),
        ArtifactStore::new(downloaded.path(), "https://bot.example.com"),
        500,
    );
    let router = create_router(
        AppState::new(Dispatcher::new(ctx), SECRET),
        static_dir.path(),
        downloaded.path(),
    );

    Ok(Harness {
        router,
        replies,
        downloaded,
        _static: static_dir,
    })
}

fn signed_post(body: &str) -> Result<Request<Body>, Box<dyn std::error::Error>> {
    let signature = compute_signature(SECRET, body.as_bytes()).ok_or("signing failed")?;
    Ok(Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header("x-line-signature", signature)
        .body(Body::from(body.to_string()))?)
}

async fn body_bytes(response: axum::response::Response) -> Result<Vec<u8>, axum::Error> {
    Ok(response.into_body().collect().await?.to_bytes().to_vec())
}

fn recorded(replies: &Replies) -> Vec<(String, Vec<ReplyPayload>)> {
    replies.lock().map(|r| r.clone()).unwrap_or_default()
}

#[tokio::test]
async fn get_webhook_answers_probe() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness()?;
    let response = h
        .router
        .oneshot(Request::builder().uri("/webhook").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_bytes(response).await?,
        b"I'm listening. Please access with POST.".to_vec()
    );
    Ok(())
}

#[tokio::test]
async fn missing_signature_is_unauthorized() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness()?;
    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .body(Body::from(r#"{"events": []}"#))?;

    let response = h.router.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn wrong_signature_is_unauthorized() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness()?;
    let body = r#"{"events": []}"#;
    let signature = compute_signature("another-secret", body.as_bytes()).ok_or("signing failed")?;
    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("x-line-signature", signature)
        .body(Body::from(body))?;

    let response = h.router.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(recorded(&h.replies).is_empty());
    Ok(())
}

#[tokio::test]
async fn malformed_body_is_server_error() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness()?;
    let response = h.router.oneshot(signed_post("{not json")?).await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    Ok(())
}

#[tokio::test]
async fn non_array_events_is_server_error() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness()?;
    let response = h
        .router
        .oneshot(signed_post(r#"{"destination": "U0", "events": {"type": "follow"}}"#)?)
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    Ok(())
}

#[tokio::test]
async fn empty_batch_returns_empty_array() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness()?;
    let response = h
        .router
        .oneshot(signed_post(r#"{"destination": "U0", "events": []}"#)?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let outcomes: Value = serde_json::from_slice(&body_bytes(response).await?)?;
    assert_eq!(outcomes, json!([]));
    Ok(())
}

#[tokio::test]
async fn batch_replies_in_event_order() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness()?;
    let body = json!({
        "destination": "U0",
        "events": [
            {
                "type": "message",
                "replyToken": "00000000000000000000000000000000",
                "source": {"type": "user", "userId": "U1"},
                "message": {"id": "1", "type": "text", "text": "ping"}
            },
            {
                "type": "message",
                "replyToken": "token-text",
                "source": {"type": "user", "userId": "U1"},
                "message": {"id": "2", "type": "text", "text": "hello"}
            },
            {
                "type": "follow",
                "replyToken": "token-follow",
                "source": {"type": "user", "userId": "U1"}
            }
        ]
    })
    .to_string();

    let response = h.router.oneshot(signed_post(&body)?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let outcomes: Value = serde_json::from_slice(&body_bytes(response).await?)?;
    let sent = json!({"sentMessages": [{"id": "1"}]});
    assert_eq!(outcomes, json!([null, sent, sent]));

    let mut replies = recorded(&h.replies);
    replies.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        replies,
        vec![
            (
                "token-follow".to_string(),
                vec![ReplyPayload::text("Got followed event")]
            ),
            ("token-text".to_string(), vec![ReplyPayload::text("HELLO")]),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn one_failing_event_fails_the_batch() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness()?;
    let body = json!({
        "events": [
            {
                "type": "message",
                "replyToken": "expired-token",
                "source": {"type": "user", "userId": "U1"},
                "message": {"id": "1", "type": "text", "text": "late"}
            },
            {
                "type": "join",
                "replyToken": "token-join",
                "source": {"type": "group", "groupId": "G1"}
            }
        ]
    })
    .to_string();

    let response = h.router.oneshot(signed_post(&body)?).await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // The other event still ran to completion
    assert_eq!(
        recorded(&h.replies),
        vec![("token-join".to_string(), vec![ReplyPayload::text("Joined group")])]
    );
    Ok(())
}

#[tokio::test]
async fn managed_image_is_published_under_downloaded() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness()?;
    let body = json!({
        "events": [{
            "type": "message",
            "replyToken": "token-image",
            "source": {"type": "user", "userId": "U1"},
            "message": {
                "id": "abc123",
                "type": "image",
                "contentProvider": {"type": "line"}
            }
        }]
    })
    .to_string();

    let response = h.router.clone().oneshot(signed_post(&body)?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        recorded(&h.replies),
        vec![(
            "token-image".to_string(),
            vec![ReplyPayload::Image {
                original_content_url: "https://bot.example.com/downloaded/abc123.jpg".to_string(),
                preview_image_url: "https://bot.example.com/downloaded/abc123-preview.jpg"
                    .to_string(),
            }]
        )]
    );
    assert!(h.downloaded.path().join("abc123.jpg").exists());

    // The artifact is reachable over HTTP
    let response = h
        .router
        .oneshot(
            Request::builder()
                .uri("/downloaded/abc123-preview.jpg")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await?, b"content".to_vec());
    Ok(())
}

#[tokio::test]
async fn unsupported_kinds_fail_the_batch() -> Result<(), Box<dyn std::error::Error>> {
    let h = harness()?;
    let body = json!({
        "events": [
            {
                "type": "memberJoined",
                "replyToken": "token-member",
                "source": {"type": "group", "groupId": "G1"},
                "joined": {"members": [{"type": "user", "userId": "U2"}]}
            },
            {
                "type": "message",
                "replyToken": "token-file",
                "source": {"type": "user", "userId": "U1"},
                "message": {"id": "5", "type": "file", "fileName": "a.pdf", "fileSize": 10}
            },
            {
                "type": "follow",
                "replyToken": "token-follow",
                "source": {"type": "user", "userId": "U1"}
            }
        ]
    })
    .to_string();

    let response = h.router.oneshot(signed_post(&body)?).await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    assert_eq!(
        recorded(&h.replies),
        vec![(
            "token-follow".to_string(),
            vec![ReplyPayload::text("Got followed event")]
        )]
    );
    Ok(())
}
