//! Integration tests for streaming and buffered responses

use crate::integration::mock_server::{MockServerFixture, TEST_KEY};
use intelisys::pipeline::ChannelSink;
use intelisys::MessageRole;
use serde_json::json;
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

#[tokio::test]
async fn test_openai_sse_streaming_response() {
    let fixture = MockServerFixture::new().await;

    let mock = fixture
        .mock_sse_stream(
            "/chat/completions",
            vec![
                "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"},\"index\":0}]}",
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"},\"index\":0}]}",
                "data: {\"choices\":[{\"delta\":{\"content\":\" World\"},\"index\":0}]}",
                "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\",\"index\":0}]}",
                "data: [DONE]",
            ],
        )
        .await;

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let session = fixture
        .builder("openai")
        .sink(Arc::new(ChannelSink::new(tx)))
        .build()
        .await
        .unwrap();

    let reply = session.chat("Say hello").await.unwrap();
    mock.assert_async().await;

    assert_eq!(reply, json!("Hello World"));
    let history = session.history();
    assert_eq!(history.len(), 3);
    assert_eq!(history.last().unwrap().role, MessageRole::Assistant);
    assert_eq!(history.last().unwrap().content, "Hello World");

    // the sink's sender lives in the session
    drop(session);
    let deltas: Vec<String> = UnboundedReceiverStream::new(rx).collect().await;
    assert_eq!(deltas, vec!["Hello", " World"]);
}

#[tokio::test]
async fn test_anthropic_sse_streaming_response() {
    let fixture = MockServerFixture::new().await;

    let mock = {
        let mut server = fixture.server.lock().await;
        server
            .mock("POST", "/messages")
            .match_header("x-api-key", TEST_KEY)
            .match_header("anthropic-version", "2023-06-01")
            .match_body(mockito::Matcher::PartialJson(json!({
                "system": "You are terse.",
                "max_tokens": 8192,
                "stream": true
            })))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(concat!(
                "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
                "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Four\"}}\n\n",
                "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\".\"}}\n\n",
                "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"}}\n\n",
                "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
            ))
            .create_async()
            .await
    };

    let session = fixture
        .builder("anthropic")
        .system_message("You are terse.")
        .build()
        .await
        .unwrap();

    let reply = session.chat("2+2?").await.unwrap();
    mock.assert_async().await;
    assert_eq!(reply, json!("Four."));
}

#[tokio::test]
async fn test_buffered_response_with_bearer_auth() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture
        .mock_with_header(
            "/chat/completions",
            "authorization",
            &format!("Bearer {}", TEST_KEY),
            r#"{"choices":[{"message":{"role":"assistant","content":"pong"},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#,
        )
        .await;

    let session = fixture
        .builder("groq")
        .stream(false)
        .build()
        .await
        .unwrap();

    assert_eq!(session.chat("ping").await.unwrap(), json!("pong"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_openai_json_mode_requests_json_object() {
    let fixture = MockServerFixture::new().await;
    let mock = {
        let mut server = fixture.server.lock().await;
        server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJson(json!({
                "response_format": {"type": "json_object"}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"{\"answer\": 4}"}}]}"#)
            .create_async()
            .await
    };

    let session = fixture
        .builder("openai")
        .stream(false)
        .json_mode(true)
        .build()
        .await
        .unwrap();

    let reply = session.chat("2+2 as json").await.unwrap();
    mock.assert_async().await;
    assert_eq!(reply, json!({"answer": 4}));
    assert_eq!(session.last_response(), Some(json!({"answer": 4})));
}
