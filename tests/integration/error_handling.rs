//! Integration tests for provider errors and retries

use crate::integration::mock_server::MockServerFixture;
use intelisys::Error;

#[tokio::test]
async fn test_retry_on_transient_error_until_exhausted() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture
        .mock_error_response(
            "/chat/completions",
            503,
            r#"{"error":{"message":"Service overloaded"}}"#,
            3,
        )
        .await;

    let session = fixture
        .builder("openrouter")
        .stream(false)
        .max_retry(3)
        .build()
        .await
        .unwrap();

    let err = tokio_test::assert_err!(session.chat("hello").await);
    mock.assert_async().await;

    match &err {
        Error::MaxRetriesExceeded { attempts, .. } => assert_eq!(*attempts, 3),
        other => panic!("expected MaxRetriesExceeded, got {:?}", other),
    }
    match err.last_cause() {
        Error::Request { message, status } => {
            assert_eq!(message, "Service overloaded");
            assert_eq!(*status, Some(503));
        }
        other => panic!("expected Request, got {:?}", other),
    }

    // the user turn is kept, no assistant turn was added
    let history = session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history.last().unwrap().content, "hello");
}

#[tokio::test]
async fn test_missing_content_is_a_request_error() {
    let fixture = MockServerFixture::new().await;
    let _mock = fixture
        .mock_json_response("/chat/completions", 200, r#"{"choices":[]}"#)
        .await;

    let session = fixture
        .builder("groq")
        .stream(false)
        .max_retry(1)
        .build()
        .await
        .unwrap();

    let err = session.chat("hello").await.unwrap_err();
    assert!(matches!(
        err.last_cause(),
        Error::Request { status: None, .. }
    ));
}

#[tokio::test]
async fn test_connection_refused_is_retried_transport_error() {
    let session = intelisys::Session::builder()
        .provider("openai")
        .api_key("sk")
        .base_url_override("http://127.0.0.1:9")
        .retry_delay(std::time::Duration::ZERO)
        .max_retry(2)
        .stream(false)
        .build()
        .await
        .unwrap();

    let err = session.chat("hello").await.unwrap_err();
    assert!(matches!(err, Error::MaxRetriesExceeded { attempts: 2, .. }));
    assert!(matches!(err.last_cause(), Error::Transport(_)));
}
