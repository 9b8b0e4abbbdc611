use std::sync::Arc;
use tokio::time::Duration;
use tracing::info;

use super::{BlockingSession, Session};
use crate::config::SessionConfig;
use crate::error::ErrorContext;
use crate::history::Conversation;
use crate::pipeline::{BackoffKind, NoopSink, ResponsePipeline, StdoutSink, StreamSink};
use crate::provider::{Provider, API_VAULT};
use crate::secrets::{default_secret_provider, SecretProvider};
use crate::structured::JsonRepairPolicy;
use crate::transport::{ChatTransport, HttpTransport, HttpTransportConfig};
use crate::types::message::Message;
use crate::{Error, Result};

/// Builder for [`Session`].
///
/// Everything has a default; the minimal session is
/// `Session::builder().build().await?` against Anthropic with the key taken
/// from `ANTHROPIC_API_KEY` or the keyring.
pub struct SessionBuilder {
    config: SessionConfig,
    provider_name: Option<String>,
    api_key: Option<String>,
    secrets: Option<Arc<dyn SecretProvider>>,
    transport: Option<Arc<dyn ChatTransport>>,
    sink: Option<Arc<dyn StreamSink>>,
    /// Override base URL (primarily for testing with mock servers)
    base_url_override: Option<String>,
    history: Option<Vec<Message>>,
    system_message: Option<String>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::from_config(SessionConfig::default())
    }

    /// Start from an existing configuration, e.g. one loaded from YAML.
    pub fn from_config(config: SessionConfig) -> Self {
        Self {
            config,
            provider_name: None,
            api_key: None,
            secrets: None,
            transport: None,
            sink: None,
            base_url_override: None,
            history: None,
            system_message: None,
        }
    }

    /// Provider by name (`openai`, `anthropic`, `openrouter`, `groq`).
    /// Unknown names fail at [`build`](Self::build) with a suggestion.
    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    pub fn provider_kind(mut self, provider: Provider) -> Self {
        self.provider_name = None;
        self.config.provider = provider;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Use this key instead of asking the secret provider.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = Some(max_tokens);
        self
    }

    pub fn stream(mut self, enable: bool) -> Self {
        self.config.stream = enable;
        self
    }

    pub fn json_mode(mut self, enable: bool) -> Self {
        self.config.json_mode = enable;
        self
    }

    pub fn json_repair_policy(mut self, policy: JsonRepairPolicy) -> Self {
        self.config.json_repair_policy = policy;
        self
    }

    /// Total attempts per request.
    ///
    /// Can also be set via env `INTELISYS_MAX_RETRY`, which wins.
    pub fn max_retry(mut self, attempts: u32) -> Self {
        self.config.max_retry = attempts;
        self
    }

    /// Delay between attempts.
    ///
    /// Can also be set via env `INTELISYS_RETRY_DELAY_MS`, which wins.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn backoff(mut self, kind: BackoffKind) -> Self {
        self.config.backoff = kind;
        self
    }

    pub fn max_history_words(mut self, words: usize) -> Self {
        self.config.max_history_words = words;
        self
    }

    pub fn max_words_per_message(mut self, words: usize) -> Self {
        self.config.max_words_per_message = Some(words);
        self
    }

    pub fn print_color(mut self, color: impl Into<String>) -> Self {
        self.config.print_color = color.into();
        self
    }

    /// Echo streamed output to stdout in the print color.
    pub fn echo(mut self, enable: bool) -> Self {
        self.config.echo = enable;
        self
    }

    /// Inject the credential source. Default: env vars, then the OS keyring.
    pub fn secret_provider(mut self, secrets: Arc<dyn SecretProvider>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Replace the HTTP transport. No API key is resolved in this case.
    pub fn transport(mut self, transport: Arc<dyn ChatTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Receive streamed deltas. Overrides [`echo`](Self::echo).
    pub fn sink(mut self, sink: Arc<dyn StreamSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Override the provider base URL.
    ///
    /// This is primarily for testing with mock servers.
    pub fn base_url_override(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into());
        self
    }

    /// Seed the conversation. A system entry in it is kept unless
    /// [`system_message`](Self::system_message) is also set.
    pub fn history(mut self, messages: Vec<Message>) -> Self {
        self.history = Some(messages);
        self
    }

    pub fn system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    /// Build the session, resolving the API key unless a transport was
    /// injected.
    pub async fn build(mut self) -> Result<Session> {
        if let Some(name) = self.provider_name.take() {
            self.config.provider = name.parse()?;
        }
        self.config.apply_env_overrides();
        self.config.validate()?;

        let provider = self.config.provider;
        let driver = provider.driver();
        let secrets = self.secrets.unwrap_or_else(default_secret_provider);

        let transport: Arc<dyn ChatTransport> = match self.transport {
            Some(t) => t,
            None => {
                let key = match self.api_key {
                    Some(k) => k,
                    None => {
                        let (item, field) = provider.vault_item();
                        secrets.resolve(item, field, API_VAULT).await?
                    }
                };
                let base_url = match self.base_url_override {
                    Some(url) => validate_base_url(&url)?,
                    None => provider.base_url().to_string(),
                };
                Arc::new(HttpTransport::new(HttpTransportConfig::new(
                    base_url,
                    driver.auth_headers(&key),
                ))?)
            }
        };

        let sink: Arc<dyn StreamSink> = match self.sink {
            Some(s) => s,
            None if self.config.echo => Arc::new(StdoutSink::new(&self.config.print_color)),
            None => Arc::new(NoopSink),
        };

        let seeded = self.history.unwrap_or_default();
        let seeded_system = seeded.iter().any(Message::is_system);
        let conversation = Conversation::from_messages(seeded);

        info!(
            name = %self.config.name,
            provider = %provider,
            model = %self.config.model(),
            stream = self.config.stream,
            json_mode = self.config.json_mode,
            max_retry = self.config.max_retry,
            max_history_words = self.config.max_history_words,
            "session initialized"
        );

        let pipeline = ResponsePipeline::new(driver, transport, sink);
        let session = Session::from_parts(self.config, pipeline, secrets, conversation);
        match self.system_message {
            Some(m) => session.replace_system_message(Some(&m)),
            None if !seeded_system => session.replace_system_message(None),
            None => {}
        }
        Ok(session)
    }

    /// Build a session driven by its own single-threaded runtime.
    pub fn build_blocking(self) -> Result<BlockingSession> {
        BlockingSession::build(self)
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_base_url(raw: &str) -> Result<String> {
    let url = url::Url::parse(raw).map_err(|e| {
        Error::configuration_with_context(
            format!("invalid base URL '{}': {}", raw, e),
            ErrorContext::new()
                .with_field_path("session.base_url_override")
                .with_source("session_builder"),
        )
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::configuration_with_context(
            format!("base URL must be http or https, got '{}'", url.scheme()),
            ErrorContext::new().with_field_path("session.base_url_override"),
        ));
    }
    Ok(raw.to_string())
}
