use serde_json::{Map, Value};
use std::ops::Deref;
use tokio::runtime::{Builder, Runtime};

use super::{Session, SessionBuilder};
use crate::error::ErrorContext;
use crate::pipeline::ChatOptions;
use crate::{Error, Result};

/// A [`Session`] for synchronous callers.
///
/// Owns a current-thread runtime and blocks on the async session methods.
/// Must not be used from inside another async runtime. Synchronous accessors
/// (`history`, `set_system_message`, ...) are reachable through `Deref`.
pub struct BlockingSession {
    runtime: Runtime,
    session: Session,
}

impl std::fmt::Debug for BlockingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingSession")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl BlockingSession {
    pub(crate) fn build(builder: SessionBuilder) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::configuration_with_context(
                    format!("failed to start runtime: {}", e),
                    ErrorContext::new().with_source("blocking_session"),
                )
            })?;
        let session = runtime.block_on(builder.build())?;
        Ok(Self { runtime, session })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_inner(self) -> Session {
        self.session
    }

    pub fn chat(&self, input: &str) -> Result<Value> {
        self.runtime.block_on(self.session.chat(input))
    }

    pub fn chat_with(&self, input: &str, options: ChatOptions) -> Result<Value> {
        self.runtime.block_on(self.session.chat_with(input, options))
    }

    pub fn get_response(&self, options: ChatOptions) -> Result<Value> {
        self.runtime.block_on(self.session.get_response(options))
    }

    pub fn template_chat(
        &self,
        data: Option<&Map<String, Value>>,
        template: Option<&str>,
        persona: Option<&str>,
    ) -> Result<Value> {
        self.runtime
            .block_on(self.session.template_chat(data, template, persona))
    }

    pub fn load_template_instruction(&self, set: &str, instruction: &str) -> Result<()> {
        self.runtime
            .block_on(self.session.load_template_instruction(set, instruction))
    }

    pub fn load_template_persona(&self, persona: &str) -> Result<()> {
        self.runtime
            .block_on(self.session.load_template_persona(persona))
    }
}

impl Deref for BlockingSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}
