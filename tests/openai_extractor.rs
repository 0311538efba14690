//! OpenAiExtractor against a local mock of the chat completions endpoint.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use chrono::DateTime;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use newsletter_stories::config::LlmConfig;
use newsletter_stories::error::ExtractionError;
use newsletter_stories::extract::{OpenAiExtractor, StoryExtractor};
use newsletter_stories::mail::ParsedMessage;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// What the mock answers with.
#[derive(Clone)]
enum Reply {
    Content(String),
    Raw(StatusCode, Value),
    Hang,
}

#[derive(Clone)]
struct MockState {
    reply: Reply,
    seen: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
}

async fn chat_completions(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.seen.lock().unwrap().push((headers, body));
    match state.reply {
        Reply::Content(content) => Json(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        }))
        .into_response(),
        Reply::Raw(status, body) => (status, Json(body)).into_response(),
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            StatusCode::OK.into_response()
        }
    }
}

/// Start the mock on a random port; returns (base_url, recorded requests).
async fn start_mock(reply: Reply) -> (String, Arc<Mutex<Vec<(HeaderMap, Value)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let state = MockState {
        reply,
        seen: seen.clone(),
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/v1"), seen)
}

fn extractor(base_url: &str, call_timeout: Duration) -> OpenAiExtractor {
    let config = LlmConfig {
        api_key: SecretString::from("sk-test-key"),
        model: "gpt-4o-mini".to_string(),
        base_url: base_url.to_string(),
        max_tokens: 4096,
    };
    OpenAiExtractor::new(config, call_timeout).unwrap()
}

fn message() -> ParsedMessage {
    ParsedMessage {
        subject: "This Week in Rust 530".to_string(),
        from_email: "twir@example.com".to_string(),
        from_name: "TWiR".to_string(),
        date: DateTime::parse_from_rfc3339("2024-01-17T00:00:00+00:00").unwrap(),
        message_id: "<twir-530@example.com>".to_string(),
        body: "Announcing Rust 1.75 https://blog.rust-lang.org/1.75".to_string(),
    }
}

#[tokio::test]
async fn extracts_stories_and_sends_expected_request() {
    timeout(TEST_TIMEOUT, async {
        let content = json!({"stories": [
            {"headline": "Rust 1.75 released", "teaser": "Blog post. Async fn in traits.", "url": "https://blog.rust-lang.org/1.75"},
            {"headline": "Cargo tips", "teaser": "Article. Faster builds.", "url": "https://example.com/cargo"}
        ]})
        .to_string();
        let (base, seen) = start_mock(Reply::Content(content)).await;

        let stories = extractor(&base, Duration::from_secs(2))
            .extract(&message())
            .await
            .unwrap();

        assert_eq!(stories.len(), 2);
        assert_eq!(stories[0].headline, "Rust 1.75 released");
        assert_eq!(stories[1].url, "https://example.com/cargo");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (headers, body) = &seen[0];
        assert_eq!(headers["authorization"], "Bearer sk-test-key");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_completion_tokens"], 4096);
        assert_eq!(body["response_format"]["type"], "json_object");
        let prompt = body["messages"][0]["content"].as_str().unwrap();
        assert!(prompt.contains("Subject: This Week in Rust 530"));
        assert!(prompt.contains("Announcing Rust 1.75"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn empty_story_list_is_ok() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_mock(Reply::Content(r#"{"stories": []}"#.to_string())).await;
        let stories = extractor(&base, Duration::from_secs(2))
            .extract(&message())
            .await
            .unwrap();
        assert!(stories.is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn http_error_fails() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_mock(Reply::Raw(
            StatusCode::TOO_MANY_REQUESTS,
            json!({"error": {"message": "rate limited"}}),
        ))
        .await;
        let err = extractor(&base, Duration::from_secs(2))
            .extract(&message())
            .await
            .unwrap_err();
        match err {
            ExtractionError::RequestFailed { reason, .. } => {
                assert!(reason.contains("429"), "{reason}");
                assert!(reason.contains("rate limited"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn no_choices_fails_closed() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_mock(Reply::Raw(StatusCode::OK, json!({"choices": []}))).await;
        let err = extractor(&base, Duration::from_secs(2))
            .extract(&message())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidResponse { .. }));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn malformed_content_fails_closed() {
    timeout(TEST_TIMEOUT, async {
        let content = r#"{"stories": [{"headline": "ok", "url": "https://e.com"}, "oops"]}"#;
        let (base, _) = start_mock(Reply::Content(content.to_string())).await;
        let err = extractor(&base, Duration::from_secs(2))
            .extract(&message())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidResponse { .. }));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn slow_upstream_times_out() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_mock(Reply::Hang).await;
        let err = extractor(&base, Duration::from_millis(200))
            .extract(&message())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Timeout(_)), "{err:?}");
    })
    .await
    .expect("test timed out");
}
