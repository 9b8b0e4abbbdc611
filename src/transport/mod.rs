//! Transport layer: how a [`DriverRequest`] reaches a provider.
//!
//! The response pipeline only talks to the [`ChatTransport`] trait, so tests
//! can script responses without a network while production sessions use
//! [`HttpTransport`].

pub mod http;

use crate::drivers::DriverRequest;
use crate::{BoxStream, Result};
use async_trait::async_trait;
use bytes::Bytes;

pub use http::{HttpTransport, HttpTransportConfig};

/// Raw provider reply, before any driver-specific extraction.
pub enum TransportResponse {
    /// Complete JSON body of a non-streaming call.
    Buffered(serde_json::Value),
    /// Raw SSE byte stream of a streaming call.
    Stream(BoxStream<'static, Bytes>),
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportResponse::Buffered(v) => f.debug_tuple("Buffered").field(v).finish(),
            TransportResponse::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Sends one provider request.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: &DriverRequest) -> Result<TransportResponse>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}
