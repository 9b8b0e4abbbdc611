//! 响应流水线：把会话历史变成一次模型回复。
//!
//! # Response Pipeline
//!
//! Turns a [`Conversation`] into a provider request, reads the reply (buffered
//! or streamed), optionally parses it as JSON and commits it back into the
//! history. Failed attempts are retried under a [`BackoffPolicy`].
//!
//! ```text
//! Idle → Requesting ─┬→ Streaming → Accumulating ─┬→ Parsing → Committed
//!                    └→ Buffered ─────────────────┘
//!        any failure → Retrying → Requesting … → Failed
//! ```
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`decode`] | SSE framing of the raw byte stream |
//! | [`accumulate`] | Folding stream events into one response |
//! | [`retry`] | Backoff delays with cancellation |
//! | [`sink`] | Echo targets for streamed deltas |

pub mod accumulate;
pub mod decode;
pub mod retry;
pub mod sink;

use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::config::SessionConfig;
use crate::drivers::{ProviderDriver, RequestParams};
use crate::history::Conversation;
use crate::structured::parse_json_response;
use crate::transport::{ChatTransport, TransportResponse};
use crate::types::message::Message;
use crate::{BoxStream, Error, Result};

use accumulate::PendingResponse;
use bytes::Bytes;
use decode::SseDecoder;
pub use retry::{BackoffKind, BackoffPolicy};
pub use sink::{ChannelSink, NoopSink, StdoutSink, StreamSink};

/// Per-call overrides of the session configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    /// Token ceiling for this call only.
    pub max_tokens: Option<u32>,
    /// Extra body parameters merged into the provider request.
    pub extra: Option<Value>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// Where a request currently is. Only used for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Requesting,
    Streaming,
    Accumulating,
    Buffered,
    Parsing,
    Committed,
    Retrying,
    Failed,
}

/// Provider driver, transport and echo sink for one session.
pub struct ResponsePipeline {
    driver: Box<dyn ProviderDriver>,
    transport: Arc<dyn ChatTransport>,
    sink: Arc<dyn StreamSink>,
}

impl std::fmt::Debug for ResponsePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponsePipeline")
            .field("driver", &self.driver)
            .finish_non_exhaustive()
    }
}

impl ResponsePipeline {
    pub fn new(
        driver: Box<dyn ProviderDriver>,
        transport: Arc<dyn ChatTransport>,
        sink: Arc<dyn StreamSink>,
    ) -> Self {
        Self {
            driver,
            transport,
            sink,
        }
    }

    pub fn driver(&self) -> &dyn ProviderDriver {
        self.driver.as_ref()
    }

    /// Obtain a reply for `history` and commit it as an assistant entry.
    ///
    /// Retryable failures are retried up to `config.max_retry` attempts in
    /// total; the last one is wrapped in [`Error::MaxRetriesExceeded`].
    /// `history` is only modified on success.
    pub async fn get_response(
        &self,
        config: &SessionConfig,
        history: &mut Conversation,
        options: &ChatOptions,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let max_retry = config.max_retry.max(1);
        let backoff = config.backoff();
        let mut attempt: u32 = 0;

        trace!(state = ?PipelineState::Idle, "pipeline start");
        loop {
            attempt += 1;
            trace!(state = ?PipelineState::Requesting, attempt, "pipeline");

            let err = match self.attempt(config, history.messages(), options, cancel).await {
                Ok(value) => {
                    Self::commit(history, &value, config.max_history_words);
                    trace!(state = ?PipelineState::Committed, attempt, "pipeline");
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                trace!(state = ?PipelineState::Failed, attempt, error = %err, "pipeline");
                return Err(err);
            }

            warn!(attempt, max_retry, error = %err, "response attempt failed");
            if attempt >= max_retry {
                trace!(state = ?PipelineState::Failed, attempt, "pipeline");
                return Err(Error::MaxRetriesExceeded {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            trace!(state = ?PipelineState::Retrying, attempt, "pipeline");
            backoff.wait(attempt, cancel).await?;
        }
    }

    /// One request/response round trip without retries or commit.
    pub async fn attempt(
        &self,
        config: &SessionConfig,
        messages: &[Message],
        options: &ChatOptions,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let request = self.driver.build_request(&RequestParams {
            messages,
            model: config.model(),
            temperature: config.temperature,
            max_tokens: options.max_tokens.unwrap_or_else(|| config.token_ceiling()),
            stream: config.stream,
            json_mode: config.json_mode,
            extra: options.extra.as_ref(),
        })?;

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            r = self.transport.send(&request) => r?,
        };

        let text = match response {
            TransportResponse::Buffered(body) => {
                trace!(state = ?PipelineState::Buffered, "pipeline");
                self.driver
                    .parse_response(&body)?
                    .content
                    .ok_or_else(|| Error::request("provider response carried no content"))?
            }
            TransportResponse::Stream(bytes) => {
                trace!(state = ?PipelineState::Streaming, "pipeline");
                self.accumulate(bytes, cancel).await?.finish()
            }
        };

        if !config.json_mode {
            return Ok(Value::String(text));
        }

        trace!(state = ?PipelineState::Parsing, "pipeline");
        let enforced = self.driver.provider().enforces_json_mode();
        parse_json_response(&text, enforced, config.json_repair_policy)
    }

    /// Fold a raw SSE stream into one pending response, echoing deltas.
    async fn accumulate(
        &self,
        bytes: BoxStream<'static, Bytes>,
        cancel: &CancellationToken,
    ) -> Result<PendingResponse> {
        let mut frames = SseDecoder::new().decode_stream(bytes);
        let mut pending = PendingResponse::new();
        trace!(state = ?PipelineState::Accumulating, "pipeline");

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                frame = frames.next() => frame,
            };
            let Some(frame) = next else { break };
            let data = frame?;

            if self.driver.is_stream_done(&data) {
                break;
            }
            if let Some(event) = self.driver.parse_stream_event(&data)? {
                if let Some(delta) = pending.apply(&event)? {
                    trace!(chunk = pending.chunks(), delta, "stream delta");
                    self.sink.on_delta(delta);
                }
            }
        }

        self.sink.on_complete();
        Ok(pending)
    }

    fn commit(history: &mut Conversation, value: &Value, max_words: usize) {
        let content = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        history.push(Message::assistant(content));
        history.trim(max_words);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use crate::drivers::DriverRequest;
    use crate::types::message::MessageRole;
    use async_trait::async_trait;
    use futures::stream;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum Reply {
        Text(&'static str),
        Sse(Vec<&'static str>),
        /// One frame, then a stream that never yields again.
        SseThenStall(&'static str),
        Fail,
    }

    /// Cancels the request as soon as the first delta arrives.
    struct CancelOnDelta(CancellationToken);

    impl StreamSink for CancelOnDelta {
        fn on_delta(&self, _text: &str) {
            self.0.cancel();
        }
    }

    struct Scripted {
        replies: Mutex<VecDeque<Reply>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatTransport for Scripted {
        async fn send(&self, _request: &DriverRequest) -> Result<TransportResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.lock().unwrap().pop_front() {
                Some(Reply::Text(t)) => Ok(TransportResponse::Buffered(json!({
                    "choices": [{"message": {"role": "assistant", "content": t}, "finish_reason": "stop"}]
                }))),
                Some(Reply::Sse(frames)) => Ok(TransportResponse::Stream(Box::pin(stream::iter(
                    frames.into_iter().map(|f| Ok(Bytes::from(f))),
                )))),
                Some(Reply::SseThenStall(frame)) => Ok(TransportResponse::Stream(Box::pin(
                    stream::iter(vec![Ok(Bytes::from(frame))]).chain(stream::pending()),
                ))),
                Some(Reply::Fail) | None => Err(Error::request_with_status("overloaded", 503)),
            }
        }
    }

    fn config(json_mode: bool) -> SessionConfig {
        SessionConfig {
            provider: Provider::Groq,
            json_mode,
            max_retry: 3,
            retry_delay_ms: 0,
            ..SessionConfig::default()
        }
    }

    fn pipeline(transport: Arc<Scripted>) -> ResponsePipeline {
        ResponsePipeline::new(Provider::Groq.driver(), transport, Arc::new(NoopSink))
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let transport = Scripted::new(vec![Reply::Fail, Reply::Fail, Reply::Text("ok")]);
        let p = pipeline(transport.clone());
        let mut history = Conversation::default();
        history.push(Message::user("hi"));

        let v = p
            .get_response(&config(false), &mut history, &ChatOptions::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(v, json!("ok"));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert_eq!(history.last().unwrap(), &Message::assistant("ok"));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retry() {
        let transport = Scripted::new(vec![]);
        let p = pipeline(transport.clone());
        let mut history = Conversation::default();
        history.push(Message::user("hi"));
        let before = history.clone();

        let err = p
            .get_response(&config(false), &mut history, &ChatOptions::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MaxRetriesExceeded { attempts: 3, .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert_eq!(history, before);
    }

    #[tokio::test]
    async fn test_streamed_json_is_repaired_and_committed_compactly() {
        let transport = Scripted::new(vec![Reply::Sse(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"{'a': \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"1}\"}}]}\n\n",
            "data: [DONE]\n\n",
        ])]);
        let p = pipeline(transport);
        let mut history = Conversation::default();
        history.push(Message::user("give me json"));

        let v = p
            .get_response(&config(true), &mut history, &ChatOptions::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(v, json!({"a": 1}));
        assert_eq!(history.last().unwrap().content, r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_unparsable_json_is_retried() {
        let transport = Scripted::new(vec![Reply::Text("not json"), Reply::Text("{\"b\": 2}")]);
        let p = pipeline(transport.clone());
        let mut history = Conversation::default();
        history.push(Message::user("json please"));

        let v = p
            .get_response(&config(true), &mut history, &ChatOptions::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(v, json!({"b": 2}));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_sending() {
        let transport = Scripted::new(vec![Reply::Text("never")]);
        let p = pipeline(transport.clone());
        let mut history = Conversation::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = p
            .get_response(&config(false), &mut history, &ChatOptions::new(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stream_error_event_fails_attempt() {
        let transport = Scripted::new(vec![
            Reply::Sse(vec!["data: {\"error\":{\"message\":\"rate limited\"}}\n\n"]),
            Reply::Text("recovered"),
        ]);
        let p = pipeline(transport.clone());
        let mut history = Conversation::default();

        let v = p
            .get_response(&config(false), &mut history, &ChatOptions::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(v, json!("recovered"));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_between_stream_chunks() {
        let transport = Scripted::new(vec![Reply::SseThenStall(
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
        )]);
        let cancel = CancellationToken::new();
        let p = ResponsePipeline::new(
            Provider::Groq.driver(),
            transport.clone(),
            Arc::new(CancelOnDelta(cancel.clone())),
        );
        let mut history = Conversation::default();
        history.push(Message::user("stream please"));
        let before = history.clone();

        let err = p
            .get_response(&config(false), &mut history, &ChatOptions::new(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(history, before);
        assert!(history.turns().iter().all(|m| m.role != MessageRole::Assistant));
    }
}
