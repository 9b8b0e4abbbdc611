//! Streaming decoder (Bytes -> SSE `data:` payloads)
//!
//! The decoder only handles SSE *framing*. Event semantics (deltas, done
//! sentinels, in-band errors) belong to the provider driver.

use crate::{BoxStream, PipeResult};
use bytes::Bytes;
use futures::{stream, StreamExt};

/// Minimal SSE decoder:
/// - splits frames on a blank line (`\n\n`, `\r\n\r\n` normalized)
/// - joins the `data:` lines of a frame
/// - skips comment lines and `event:` / `id:` / `retry:` fields
pub struct SseDecoder {
    delimiter: String,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            delimiter: "\n\n".to_string(),
        }
    }

    /// Extract the data payload of one frame, if it carries any.
    fn frame_payload(frame: &str) -> Option<String> {
        let mut data_lines: Vec<&str> = Vec::new();
        for line in frame.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("data:") {
                data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
            }
        }
        if data_lines.is_empty() {
            None
        } else {
            Some(data_lines.join("\n"))
        }
    }

    /// Decode a byte stream into a stream of frame payloads.
    ///
    /// Bytes are buffered raw and only converted to text per complete frame,
    /// so multi-byte characters split across network chunks survive.
    pub fn decode_stream(
        &self,
        input: BoxStream<'static, Bytes>,
    ) -> BoxStream<'static, String> {
        let delimiter = self.delimiter.clone().into_bytes();

        // Incrementally buffer bytes and emit full frames split by delimiter.
        let stream = stream::unfold(
            (input, Vec::<u8>::new(), false),
            move |(mut input, mut buf, finished)| {
                let delimiter = delimiter.clone();
                async move {
                    loop {
                        if let Some(idx) = find_subslice(&buf, &delimiter) {
                            let frame = String::from_utf8_lossy(&buf[..idx]).into_owned();
                            buf.drain(..idx + delimiter.len());
                            if let Some(payload) = Self::frame_payload(&frame) {
                                return Some((Ok(payload), (input, buf, finished)));
                            }
                            continue;
                        }

                        if finished {
                            return None;
                        }

                        match input.next().await {
                            Some(Ok(bytes)) => {
                                // CRLF framing is normalized to LF.
                                buf.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
                            }
                            Some(Err(e)) => {
                                return Some((Err(e), (input, Vec::new(), true)));
                            }
                            None => {
                                // EOF: flush whatever is left as a final frame.
                                let rest = String::from_utf8_lossy(&buf).into_owned();
                                return Self::frame_payload(&rest)
                                    .map(|payload| (Ok(payload), (input, Vec::new(), true)));
                            }
                        }
                    }
                }
            },
        );

        Box::pin(stream)
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Collect a decoded stream for tests and benchmarks.
pub async fn collect_payloads(stream: BoxStream<'static, String>) -> PipeResult<Vec<String>> {
    let items: Vec<PipeResult<String>> = stream.collect().await;
    items.into_iter().collect()
}
