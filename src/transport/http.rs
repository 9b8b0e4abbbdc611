use super::{ChatTransport, TransportError, TransportResponse};
use crate::drivers::DriverRequest;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Proxy;
use std::env;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub base_url: String,
    /// Authentication headers produced by the provider driver.
    pub auth_headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub proxy_url: Option<String>,
}

impl HttpTransportConfig {
    /// Defaults with env overrides:
    /// - `INTELISYS_HTTP_TIMEOUT_SECS` (default 120)
    /// - `INTELISYS_PROXY_URL`
    pub fn new(base_url: impl Into<String>, auth_headers: Vec<(String, String)>) -> Self {
        let timeout_secs = env::var("INTELISYS_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self {
            base_url: base_url.into(),
            auth_headers,
            timeout: Duration::from_secs(timeout_secs),
            proxy_url: env::var("INTELISYS_PROXY_URL").ok(),
        }
    }
}

/// `reqwest`-backed transport for all providers.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    auth_headers: Vec<(String, String)>,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url).map_err(TransportError::Http)?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(TransportError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_headers: config.auth_headers,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn execute(&self, request: &DriverRequest) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, request.path);
        let request_id = Uuid::new_v4().to_string();
        debug!(%url, %request_id, stream = request.stream, "dispatching provider request");

        let mut req = self.client.post(&url).json(&request.body);
        let headers = self
            .auth_headers
            .iter()
            .map(|(k, v)| (k, v))
            .chain(request.headers.iter());
        for (k, v) in headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if request.stream {
            req = req.header("accept", "text/event-stream");
        }
        req = req.header("x-request-id", request_id);

        let resp = req.send().await.map_err(TransportError::Http)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::request_with_status(
                Self::error_message(&body).unwrap_or(body),
                status.as_u16(),
            ));
        }
        Ok(resp)
    }

    /// Best-effort extraction of `error.message` from a provider error body.
    fn error_message(body: &str) -> Option<String> {
        let json: serde_json::Value = serde_json::from_str(body).ok()?;
        json.pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(String::from)
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, request: &DriverRequest) -> Result<TransportResponse> {
        let resp = self.execute(request).await?;
        if request.stream {
            let byte_stream = resp
                .bytes_stream()
                .map_err(|e| Error::Transport(TransportError::Http(e)));
            Ok(TransportResponse::Stream(Box::pin(byte_stream)))
        } else {
            let json = resp.json().await.map_err(TransportError::Http)?;
            Ok(TransportResponse::Buffered(json))
        }
    }
}
