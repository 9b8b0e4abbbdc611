//! Where streamed deltas are echoed while a response is being accumulated.

use colored::{Color, Colorize};
use std::io::Write;
use tokio::sync::mpsc::UnboundedSender;

/// Receives text deltas as they arrive.
pub trait StreamSink: Send + Sync {
    fn on_delta(&self, text: &str);

    /// Called once after a streamed response completed successfully.
    fn on_complete(&self) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl StreamSink for NoopSink {
    fn on_delta(&self, _text: &str) {}
}

/// Prints deltas to stdout in a color, ending the response with a newline.
#[derive(Debug, Clone)]
pub struct StdoutSink {
    color: Color,
}

impl StdoutSink {
    /// Unknown color names fall back to white.
    pub fn new(color: &str) -> Self {
        Self {
            color: Color::from(color),
        }
    }
}

impl StreamSink for StdoutSink {
    fn on_delta(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        // stdout failures must not fail the request
        let _ = write!(out, "{}", text.color(self.color));
        let _ = out.flush();
    }

    fn on_complete(&self) {
        println!();
    }
}

/// Forwards deltas to an async consumer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl StreamSink for ChannelSink {
    fn on_delta(&self, text: &str) {
        // A dropped receiver only means nobody is listening anymore.
        let _ = self.tx.send(text.to_string());
    }
}
