//! Streaming events normalized across providers

use serde::{Deserialize, Serialize};

/// Unified streaming event enum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum StreamingEvent {
    /// Partial content delta (text streaming)
    #[serde(rename = "PartialContentDelta")]
    PartialContentDelta {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sequence_id: Option<u64>,
    },

    /// Stream end
    #[serde(rename = "StreamEnd")]
    StreamEnd {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },

    /// Stream error reported in-band by the provider
    #[serde(rename = "StreamError")]
    StreamError { error: serde_json::Value },
}
