use crate::types::events::StreamingEvent;
use crate::{Error, Result};

/// Accumulation buffer for one streamed completion.
///
/// Lives only for the duration of a single attempt; [`PendingResponse::finish`]
/// consumes it into the final text.
#[derive(Debug, Default)]
pub struct PendingResponse {
    buffer: String,
    chunks: usize,
    finish_reason: Option<String>,
}

impl PendingResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the buffer.
    ///
    /// Returns the text delta that was appended, if any, so the caller can
    /// echo it. In-band provider errors fail the attempt.
    pub fn apply<'e>(&mut self, event: &'e StreamingEvent) -> Result<Option<&'e str>> {
        match event {
            StreamingEvent::PartialContentDelta { content, .. } => {
                self.buffer.push_str(content);
                self.chunks += 1;
                Ok(Some(content.as_str()))
            }
            StreamingEvent::StreamEnd { finish_reason } => {
                if self.finish_reason.is_none() {
                    self.finish_reason = finish_reason.clone();
                }
                Ok(None)
            }
            StreamingEvent::StreamError { error } => {
                let message = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(String::from)
                    .unwrap_or_else(|| error.to_string());
                Err(Error::request(format!("provider stream error: {}", message)))
            }
        }
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    pub fn finish(self) -> String {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(s: &str) -> StreamingEvent {
        StreamingEvent::PartialContentDelta {
            content: s.to_string(),
            sequence_id: None,
        }
    }

    #[test]
    fn test_deltas_concatenate_in_order() {
        let mut pending = PendingResponse::new();
        for ev in [delta("Hel"), delta("lo"), delta("!")] {
            pending.apply(&ev).unwrap();
        }
        pending
            .apply(&StreamingEvent::StreamEnd {
                finish_reason: Some("stop".into()),
            })
            .unwrap();
        assert_eq!(pending.chunks(), 3);
        assert_eq!(pending.finish_reason(), Some("stop"));
        assert_eq!(pending.finish(), "Hello!");
    }

    #[test]
    fn test_first_finish_reason_wins() {
        let mut pending = PendingResponse::new();
        for reason in ["length", "stop"] {
            pending
                .apply(&StreamingEvent::StreamEnd {
                    finish_reason: Some(reason.into()),
                })
                .unwrap();
        }
        assert_eq!(pending.finish_reason(), Some("length"));
    }

    #[test]
    fn test_stream_error_fails_attempt() {
        let mut pending = PendingResponse::new();
        let err = pending
            .apply(&StreamingEvent::StreamError {
                error: serde_json::json!({"type": "overloaded_error", "message": "Overloaded"}),
            })
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("Overloaded"));
    }
}
