//! Provider driver abstraction layer.
//!
//! Each provider API family gets one [`ProviderDriver`] implementation that owns
//! all wire-shape knowledge: how to build the request body, where the text lives
//! in a buffered response, and how to pull deltas out of a streamed frame. The
//! driver is selected once when a session is built (see
//! [`Provider::driver`](crate::provider::Provider::driver)), so the response
//! pipeline never branches on provider names.

pub mod anthropic;

use serde_json::Value;
use std::collections::HashMap;

use crate::error::Error;
use crate::provider::Provider;
use crate::types::events::StreamingEvent;
use crate::types::message::Message;

pub use anthropic::AnthropicDriver;

/// Unified parameters for one chat request.
#[derive(Debug, Clone)]
pub struct RequestParams<'a> {
    /// Full message list. The first entry is the system message.
    pub messages: &'a [Message],
    pub model: &'a str,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
    /// Ask the provider to emit a JSON object (only honored where supported).
    pub json_mode: bool,
    /// Caller-supplied top-level body fields, merged last.
    pub extra: Option<&'a Value>,
}

/// Unified HTTP request representation for provider communication.
#[derive(Debug, Clone)]
pub struct DriverRequest {
    /// Path relative to the provider base URL (e.g. `/chat/completions`).
    pub path: String,
    /// Provider-specific request headers (auth is added by the transport).
    pub headers: HashMap<String, String>,
    /// Serialized JSON request body.
    pub body: Value,
    /// Whether streaming is requested.
    pub stream: bool,
}

/// Unified chat response from provider.
#[derive(Debug, Clone)]
pub struct DriverResponse {
    /// Extracted text content.
    pub content: Option<String>,
    /// Finish reason normalized to OpenAI vocabulary.
    pub finish_reason: Option<String>,
    /// Token usage statistics.
    pub usage: Option<UsageInfo>,
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Core trait for provider-specific API adaptation.
///
/// The trait is object-safe and used as `Box<dyn ProviderDriver>`.
pub trait ProviderDriver: Send + Sync + std::fmt::Debug {
    /// Provider this driver speaks for.
    fn provider(&self) -> Provider;

    /// Build a provider-specific HTTP request from unified parameters.
    fn build_request(&self, params: &RequestParams<'_>) -> Result<DriverRequest, Error>;

    /// Parse a non-streaming response into unified format.
    fn parse_response(&self, body: &Value) -> Result<DriverResponse, Error>;

    /// Parse a single streaming event from a raw SSE `data:` payload.
    fn parse_stream_event(&self, data: &str) -> Result<Option<StreamingEvent>, Error>;

    /// Check if the done signal has been received in streaming.
    fn is_stream_done(&self, data: &str) -> bool;

    /// Authentication headers for the resolved API key.
    fn auth_headers(&self, api_key: &str) -> Vec<(String, String)> {
        vec![("authorization".into(), format!("Bearer {}", api_key))]
    }
}

pub(crate) fn merge_extra(body: &mut Value, extra: Option<&Value>) {
    if let Some(Value::Object(map)) = extra {
        for (k, v) in map {
            body[k] = v.clone();
        }
    }
}

/// OpenAI-compatible driver: works for OpenAI, OpenRouter and Groq.
#[derive(Debug)]
pub struct OpenAiDriver {
    provider: Provider,
}

impl OpenAiDriver {
    pub fn new(provider: Provider) -> Self {
        Self { provider }
    }
}

impl ProviderDriver for OpenAiDriver {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn build_request(&self, params: &RequestParams<'_>) -> Result<DriverRequest, Error> {
        let oai_messages: Vec<Value> = params
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = serde_json::json!({
            "model": params.model,
            "messages": oai_messages,
            "stream": params.stream,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        });

        if params.json_mode && self.provider.enforces_json_mode() {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        merge_extra(&mut body, params.extra);

        Ok(DriverRequest {
            path: "/chat/completions".into(),
            headers: HashMap::new(),
            body,
            stream: params.stream,
        })
    }

    fn parse_response(&self, body: &Value) -> Result<DriverResponse, Error> {
        let content = body
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(String::from);
        let finish_reason = body
            .pointer("/choices/0/finish_reason")
            .and_then(|v| v.as_str())
            .map(String::from);
        let usage = body.get("usage").map(|u| UsageInfo {
            prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0),
            total_tokens: u["total_tokens"].as_u64().unwrap_or(0),
        });

        Ok(DriverResponse {
            content,
            finish_reason,
            usage,
        })
    }

    fn parse_stream_event(&self, data: &str) -> Result<Option<StreamingEvent>, Error> {
        if data.trim().is_empty() || self.is_stream_done(data) {
            return Ok(None);
        }
        let v: Value = serde_json::from_str(data)
            .map_err(|e| Error::request(format!("Failed to parse SSE data: {}", e)))?;

        if let Some(error) = v.get("error") {
            return Ok(Some(StreamingEvent::StreamError {
                error: error.clone(),
            }));
        }

        // Content delta
        if let Some(content) = v.pointer("/choices/0/delta/content").and_then(|c| c.as_str()) {
            if !content.is_empty() {
                return Ok(Some(StreamingEvent::PartialContentDelta {
                    content: content.to_string(),
                    sequence_id: None,
                }));
            }
        }

        // Finish reason
        if let Some(reason) = v.pointer("/choices/0/finish_reason").and_then(|r| r.as_str()) {
            return Ok(Some(StreamingEvent::StreamEnd {
                finish_reason: Some(reason.to_string()),
            }));
        }

        Ok(None)
    }

    fn is_stream_done(&self, data: &str) -> bool {
        data.trim() == "[DONE]"
    }
}
