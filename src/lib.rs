//! # intelisys
//!
//! 多厂商 LLM 会话客户端：一个会话对象，统一 OpenAI、Anthropic、OpenRouter 与 Groq。
//!
//! One conversational client for several hosted LLM providers, with retries,
//! streaming output, JSON mode and prompt templates.
//!
//! ## Overview
//!
//! A [`Session`] owns one conversation with one provider. Each request goes
//! through the [`pipeline::ResponsePipeline`]: the provider driver shapes the
//! request, the transport sends it, streamed or buffered output is normalized
//! into text, JSON mode parses it, and the reply is committed to the history,
//! which is then trimmed to its word budget. Transient failures are retried.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use intelisys::Session;
//!
//! #[tokio::main]
//! async fn main() -> intelisys::Result<()> {
//!     let session = Session::builder()
//!         .provider("anthropic")
//!         .echo(true)
//!         .build()
//!         .await?;
//!
//!     let reply = session.chat("Name three prime numbers.").await?;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`provider`] | Supported providers and their defaults |
//! | [`drivers`] | Per-provider request and response shapes |
//! | [`transport`] | HTTP delivery of provider requests |
//! | [`pipeline`] | Request, stream accumulation, retry and commit |
//! | [`history`] | Conversation state and word-budget trimming |
//! | [`structured`] | JSON mode parsing and repair |
//! | [`template`] | MiniJinja prompt templates |
//! | [`secrets`] | Credential resolution |
//! | [`session`] | The conversational session, async and blocking |
//! | [`config`] | Session configuration |

pub mod config;
pub mod drivers;
pub mod history;
pub mod pipeline;
pub mod provider;
pub mod secrets;
pub mod session;
pub mod structured;
pub mod template;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use config::SessionConfig;
pub use history::Conversation;
pub use pipeline::{BackoffPolicy, ChatOptions, StreamSink};
pub use provider::Provider;
pub use secrets::SecretProvider;
pub use session::{BlockingSession, Session, SessionBuilder, TemplateScope};
pub use structured::JsonRepairPolicy;
pub use types::{
    events::StreamingEvent,
    message::{Message, MessageRole},
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A specialized Result for pipeline operations
pub type PipeResult<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `PipeResult<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = PipeResult<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
