//! Mock HTTP server setup for integration tests

use intelisys::{Session, SessionBuilder};
use mockito::{Matcher, Mock, Server, ServerGuard};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const TEST_KEY: &str = "sk-test-key";

/// Test fixture that manages a mock server
pub struct MockServerFixture {
    pub server: Arc<Mutex<ServerGuard>>,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self {
            server: Arc::new(Mutex::new(server)),
            base_url,
        }
    }

    /// Builder pointed at the mock server, with an explicit key and no
    /// backoff between retries.
    pub fn builder(&self, provider: &str) -> SessionBuilder {
        Session::builder()
            .provider(provider)
            .api_key(TEST_KEY)
            .base_url_override(&self.base_url)
            .retry_delay(Duration::ZERO)
    }

    pub async fn create_session(&self, provider: &str) -> intelisys::Result<Session> {
        self.builder(provider).build().await
    }

    /// Create a mock for a successful streaming response (SSE)
    pub async fn mock_sse_stream(&self, path: &str, chunks: Vec<&str>) -> Mock {
        let mut server = self.server.lock().await;

        // Build SSE response body
        let body = chunks
            .iter()
            .map(|chunk| {
                if chunk.starts_with("data: ") || chunk.starts_with("event: ") {
                    format!("{}\n\n", chunk)
                } else {
                    format!("data: {}\n\n", chunk)
                }
            })
            .collect::<Vec<_>>()
            .join("");

        server
            .mock("POST", path)
            .match_header("accept", "text/event-stream")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await
    }

    /// Create a mock for a successful JSON response
    pub async fn mock_json_response(&self, path: &str, status: u16, body: &str) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("POST", path)
            .with_status(status as usize)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    /// Create a mock for an error response that must be hit `hits` times
    pub async fn mock_error_response(
        &self,
        path: &str,
        status: u16,
        error_body: &str,
        hits: usize,
    ) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("POST", path)
            .with_status(status as usize)
            .with_header("content-type", "application/json")
            .with_body(error_body)
            .expect(hits)
            .create_async()
            .await
    }

    /// Mock that only answers requests carrying the given header value
    pub async fn mock_with_header(
        &self,
        path: &str,
        header: &str,
        value: &str,
        body: &str,
    ) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("POST", path)
            .match_header(header, value)
            .match_header("x-request-id", Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }
}
