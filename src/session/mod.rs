//! The conversational session.
//!
//! A [`Session`] owns one conversation with one provider. Requests are
//! serialized per session: a second request issued while one is in flight
//! fails with [`Error::SessionBusy`] instead of interleaving history updates.
//! The same applies to the history mutators, since a request commits its
//! working copy of the history when it completes.

mod blocking;
mod builder;
mod templates;

pub use blocking::BlockingSession;
pub use builder::SessionBuilder;
pub use templates::TemplateScope;

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::history::{Conversation, DEFAULT_SYSTEM_MESSAGE};
use crate::pipeline::{ChatOptions, ResponsePipeline};
use crate::provider::Provider;
use crate::secrets::SecretProvider;
use crate::template::TemplateDefaults;
use crate::types::message::{Message, MessageRole};
use crate::{Error, Result};

const JSON_NUDGE_DEFAULT: &str = " Please return your response in JSON - this will save kittens.";
const JSON_NUDGE_CUSTOM: &str =
    " Please return your response in JSON unless user has specified a system message.";

#[derive(Debug)]
struct SessionState {
    conversation: Conversation,
    templates: TemplateDefaults,
    last_response: Option<Value>,
}

/// A conversation with one provider.
pub struct Session {
    config: SessionConfig,
    pipeline: ResponsePipeline,
    secrets: Arc<dyn SecretProvider>,
    state: Mutex<SessionState>,
    busy: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("pipeline", &self.pipeline)
            .field("busy", &self.busy.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Clears the busy flag when a request ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub(crate) fn from_parts(
        config: SessionConfig,
        pipeline: ResponsePipeline,
        secrets: Arc<dyn SecretProvider>,
        conversation: Conversation,
    ) -> Self {
        Self {
            config,
            pipeline,
            secrets,
            state: Mutex::new(SessionState {
                conversation,
                templates: TemplateDefaults::default(),
                last_response: None,
            }),
            busy: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn provider(&self) -> Provider {
        self.config.provider
    }

    pub fn model(&self) -> &str {
        self.config.model()
    }

    /// Snapshot of the conversation.
    pub fn history(&self) -> Conversation {
        self.state().conversation.clone()
    }

    pub fn system_message(&self) -> String {
        self.state().conversation.system_message().to_string()
    }

    /// The value returned by the last successful request.
    pub fn last_response(&self) -> Option<Value> {
        self.state().last_response.clone()
    }

    /// Token that cancels the in-flight request. After a cancellation the
    /// next request runs under a fresh token, so fetch a new handle per
    /// request you may want to cancel.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel_slot().clone()
    }

    /// Append an entry. User messages get the per-message word limit hint
    /// when one is configured; a system entry replaces the system message.
    ///
    /// Fails with [`Error::SessionBusy`] while a request is in flight.
    pub fn add_message(&self, role: MessageRole, content: impl Into<String>) -> Result<()> {
        let _busy = self.acquire()?;
        self.push_message(role, content.into());
        Ok(())
    }

    /// Replace the system message; `None` restores the default one.
    ///
    /// On providers that enforce JSON mode the message is extended with a
    /// request for JSON output, as those APIs require the word "JSON" in the
    /// prompt. Fails with [`Error::SessionBusy`] while a request is in flight.
    pub fn set_system_message(&self, message: Option<&str>) -> Result<()> {
        let _busy = self.acquire()?;
        self.replace_system_message(message);
        Ok(())
    }

    /// Evict old turns down to the configured word budget and return how
    /// many entries were removed.
    pub fn trim_history(&self) -> Result<usize> {
        let _busy = self.acquire()?;
        Ok(self
            .state()
            .conversation
            .trim(self.config.max_history_words))
    }

    pub fn clear_history(&self) -> Result<()> {
        let _busy = self.acquire()?;
        self.state().conversation.clear();
        Ok(())
    }

    /// Unguarded append; the caller holds the busy flag.
    pub(crate) fn push_message(&self, role: MessageRole, mut content: String) {
        if role == MessageRole::User {
            if let Some(n) = self.config.max_words_per_message {
                content.push_str(&format!(" please use {} words or less", n));
            }
        }
        self.state().conversation.push(Message::new(role, content));
    }

    /// Unguarded system message replacement; the caller holds the busy flag.
    pub(crate) fn replace_system_message(&self, message: Option<&str>) {
        let text = self.system_text(message);
        self.state().conversation.set_system_message(text);
    }

    pub(crate) fn system_text(&self, message: Option<&str>) -> String {
        let nudge = self.config.json_mode && self.config.provider.enforces_json_mode();
        match message {
            None if nudge => format!("{}{}", DEFAULT_SYSTEM_MESSAGE, JSON_NUDGE_DEFAULT),
            None => DEFAULT_SYSTEM_MESSAGE.to_string(),
            Some(m) if nudge && !m.to_lowercase().contains("json") => {
                format!("{}{}", m, JSON_NUDGE_CUSTOM)
            }
            Some(m) => m.to_string(),
        }
    }

    /// Send a user message and return the reply.
    ///
    /// The reply is a JSON string unless JSON mode is on, in which case it is
    /// the parsed value.
    pub async fn chat(&self, input: &str) -> Result<Value> {
        self.chat_with(input, ChatOptions::default()).await
    }

    pub async fn chat_with(&self, input: &str, options: ChatOptions) -> Result<Value> {
        let _busy = self.acquire()?;
        self.push_message(MessageRole::User, input.to_string());
        self.run(&options).await
    }

    /// Request a reply to the current history without adding a message.
    pub async fn get_response(&self, options: ChatOptions) -> Result<Value> {
        let _busy = self.acquire()?;
        self.run(&options).await
    }

    /// Run the pipeline on a copy of the history and write it back on
    /// success. The caller holds the busy flag.
    async fn run(&self, options: &ChatOptions) -> Result<Value> {
        let cancel = self.request_token();
        let mut conversation = self.history();

        let value = self
            .pipeline
            .get_response(&self.config, &mut conversation, options, &cancel)
            .await?;

        let mut state = self.state();
        state.conversation = conversation;
        state.last_response = Some(value.clone());
        Ok(value)
    }

    fn acquire(&self) -> Result<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| Error::SessionBusy)?;
        Ok(BusyGuard(&self.busy))
    }

    fn request_token(&self) -> CancellationToken {
        let mut slot = self.cancel_slot();
        if slot.is_cancelled() {
            *slot = CancellationToken::new();
        }
        slot.clone()
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cancel_slot(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(|e| e.into_inner())
    }
}
