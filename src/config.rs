//! Session configuration.
//!
//! `SessionConfig` is plain data: it can be built in code through
//! [`SessionBuilder`](crate::session::SessionBuilder) or loaded from YAML.
//!
//! ```yaml
//! name: Researcher
//! provider: anthropic
//! temperature: 0.2
//! json_mode: true
//! json_repair_policy: lenient
//! max_retry: 3
//! retry_delay_ms: 500
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use tokio::time::Duration;

use crate::error::ErrorContext;
use crate::pipeline::retry::{BackoffKind, BackoffPolicy};
use crate::provider::Provider;
use crate::structured::JsonRepairPolicy;
use crate::{Error, Result};

/// Upper bound for the exponential backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Display name used in logs.
    pub name: String,
    pub provider: Provider,
    /// Model id; the provider default when unset.
    pub model: Option<String>,
    pub temperature: f64,
    /// Token ceiling; the provider default when unset.
    pub max_tokens: Option<u32>,
    pub stream: bool,
    pub json_mode: bool,
    pub json_repair_policy: JsonRepairPolicy,
    /// Total attempts per request, including the first.
    pub max_retry: u32,
    pub retry_delay_ms: u64,
    pub backoff: BackoffKind,
    pub max_history_words: usize,
    /// Appends a word limit hint to every user message.
    pub max_words_per_message: Option<usize>,
    /// Echo color for streamed output.
    pub print_color: String,
    /// Echo streamed deltas to stdout.
    pub echo: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "Intelisys".to_string(),
            provider: Provider::Anthropic,
            model: None,
            temperature: 0.0,
            max_tokens: None,
            stream: true,
            json_mode: false,
            json_repair_policy: JsonRepairPolicy::Strict,
            max_retry: 10,
            retry_delay_ms: 1000,
            backoff: BackoffKind::Fixed,
            max_history_words: 10_000,
            max_words_per_message: None,
            print_color: "green".to_string(),
            echo: false,
        }
    }
}

impl SessionConfig {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid session config: {}", e),
                ErrorContext::new().with_source("yaml_config"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `INTELISYS_MAX_RETRY` and `INTELISYS_RETRY_DELAY_MS` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Some(n) = env::var("INTELISYS_MAX_RETRY")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
        {
            self.max_retry = n.max(1);
        }
        if let Some(ms) = env::var("INTELISYS_RETRY_DELAY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            self.retry_delay_ms = ms;
        }
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn token_ceiling(&self) -> u32 {
        self.max_tokens
            .unwrap_or_else(|| self.provider.default_max_tokens())
    }

    pub fn backoff(&self) -> BackoffPolicy {
        let base = Duration::from_millis(self.retry_delay_ms);
        match self.backoff {
            BackoffKind::Fixed => BackoffPolicy::fixed(base),
            BackoffKind::Exponential => BackoffPolicy::exponential(base, MAX_BACKOFF),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::configuration_with_context(
                "temperature must be between 0 and 2",
                ErrorContext::new()
                    .with_field_path("session.temperature")
                    .with_details(format!("got {}", self.temperature)),
            ));
        }
        if self.max_retry == 0 {
            return Err(Error::configuration_with_context(
                "max_retry must be at least 1",
                ErrorContext::new().with_field_path("session.max_retry"),
            ));
        }
        if self.max_tokens == Some(0) {
            return Err(Error::configuration_with_context(
                "max_tokens must be positive",
                ErrorContext::new().with_field_path("session.max_tokens"),
            ));
        }
        Ok(())
    }
}
