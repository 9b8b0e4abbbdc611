//! Anthropic Messages API driver.
//!
//! Key differences from the OpenAI shape:
//! - System messages are a top-level `system` parameter, not part of `messages`.
//! - Content uses typed blocks: `[{"type": "text", "text": "..."}]`.
//! - Streaming uses `content_block_delta` events with `delta.text`.
//! - Response uses `content[0].text` instead of `choices[0].message.content`.
//! - `max_tokens` is required, not optional.

use serde_json::Value;
use std::collections::HashMap;

use crate::error::Error;
use crate::provider::Provider;
use crate::types::events::StreamingEvent;
use crate::types::message::{Message, MessageRole};

use super::{merge_extra, DriverRequest, DriverResponse, ProviderDriver, RequestParams, UsageInfo};

const API_VERSION: &str = "2023-06-01";
const BETA_MAX_TOKENS: &str = "max-tokens-3-5-sonnet-2024-07-15";

/// Anthropic Messages API driver.
#[derive(Debug, Default)]
pub struct AnthropicDriver;

impl AnthropicDriver {
    pub fn new() -> Self {
        Self
    }

    /// Extract system message and non-system messages separately.
    fn split_system_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut turns: Vec<Value> = Vec::new();

        for m in messages {
            match m.role {
                MessageRole::System => system_parts.push(&m.content),
                MessageRole::User | MessageRole::Assistant => {
                    turns.push(serde_json::json!({
                        "role": m.role.as_str(),
                        "content": [{ "type": "text", "text": m.content }],
                    }));
                }
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, turns)
    }

    fn normalize_stop_reason(reason: &str) -> String {
        match reason {
            "end_turn" => "stop".to_string(),
            "max_tokens" => "length".to_string(),
            "tool_use" => "tool_calls".to_string(),
            other => other.to_string(),
        }
    }
}

impl ProviderDriver for AnthropicDriver {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn build_request(&self, params: &RequestParams<'_>) -> Result<DriverRequest, Error> {
        let (system, msgs) = Self::split_system_messages(params.messages);

        let mut body = serde_json::json!({
            "model": params.model,
            "messages": msgs,
            "max_tokens": params.max_tokens,
            "stream": params.stream,
            "temperature": params.temperature,
        });

        if let Some(sys) = system {
            body["system"] = Value::String(sys);
        }
        merge_extra(&mut body, params.extra);

        let mut headers = HashMap::new();
        headers.insert("anthropic-version".into(), API_VERSION.into());
        headers.insert("anthropic-beta".into(), BETA_MAX_TOKENS.into());

        Ok(DriverRequest {
            path: "/messages".into(),
            headers,
            body,
            stream: params.stream,
        })
    }

    fn parse_response(&self, body: &Value) -> Result<DriverResponse, Error> {
        // { content: [{type: "text", text: "..."}], stop_reason, usage }
        let content = body
            .pointer("/content/0/text")
            .and_then(|v| v.as_str())
            .map(String::from);

        let finish_reason = body
            .get("stop_reason")
            .and_then(|v| v.as_str())
            .map(Self::normalize_stop_reason);

        let usage = body.get("usage").map(|u| UsageInfo {
            prompt_tokens: u["input_tokens"].as_u64().unwrap_or(0),
            completion_tokens: u["output_tokens"].as_u64().unwrap_or(0),
            total_tokens: u["input_tokens"].as_u64().unwrap_or(0)
                + u["output_tokens"].as_u64().unwrap_or(0),
        });

        Ok(DriverResponse {
            content,
            finish_reason,
            usage,
        })
    }

    fn parse_stream_event(&self, data: &str) -> Result<Option<StreamingEvent>, Error> {
        if data.trim().is_empty() {
            return Ok(None);
        }

        let v: Value = serde_json::from_str(data)
            .map_err(|e| Error::request(format!("Failed to parse Anthropic SSE: {}", e)))?;

        let event_type = v.get("type").and_then(|t| t.as_str()).unwrap_or("");

        match event_type {
            "content_block_delta" => {
                if let Some(text) = v.pointer("/delta/text").and_then(|t| t.as_str()) {
                    if !text.is_empty() {
                        return Ok(Some(StreamingEvent::PartialContentDelta {
                            content: text.to_string(),
                            sequence_id: v.get("index").and_then(|i| i.as_u64()),
                        }));
                    }
                }
                Ok(None)
            }
            "message_delta" => {
                let reason = v.pointer("/delta/stop_reason").and_then(|r| r.as_str());
                Ok(reason.map(|r| StreamingEvent::StreamEnd {
                    finish_reason: Some(Self::normalize_stop_reason(r)),
                }))
            }
            "message_stop" => Ok(Some(StreamingEvent::StreamEnd {
                finish_reason: Some("stop".into()),
            })),
            "error" => {
                let error = v.get("error").cloned().unwrap_or(Value::Null);
                Ok(Some(StreamingEvent::StreamError { error }))
            }
            _ => Ok(None),
        }
    }

    fn is_stream_done(&self, _data: &str) -> bool {
        // Anthropic signals done via the `message_stop` event, not a sentinel.
        false
    }

    fn auth_headers(&self, api_key: &str) -> Vec<(String, String)> {
        vec![("x-api-key".into(), api_key.to_string())]
    }
}
