//! Template-driven chat on a [`Session`].

use serde_json::{Map, Value};

use super::Session;
use crate::pipeline::ChatOptions;
use crate::secrets::PROMPT_VAULT;
use crate::structured::coerce_structured;
use crate::template::TemplateDefaults;
use crate::types::message::MessageRole;
use crate::Result;

/// Restores the previous template defaults when dropped.
///
/// Created by [`Session::template_scope`].
#[must_use = "the override ends when the scope is dropped"]
pub struct TemplateScope<'a> {
    session: &'a Session,
    previous: Option<(String, String)>,
}

impl Drop for TemplateScope<'_> {
    fn drop(&mut self) {
        if let Some((template, persona)) = self.previous.take() {
            let mut state = self.session.state();
            state.templates.template = template;
            state.templates.persona = persona;
        }
    }
}

impl Session {
    pub fn set_default_template(&self, template: impl Into<String>) {
        self.state().templates.template = template.into();
    }

    pub fn set_default_persona(&self, persona: impl Into<String>) {
        self.state().templates.persona = persona.into();
    }

    /// Replace the persistent template data.
    pub fn set_template_data(&self, data: Map<String, Value>) {
        self.state().templates.data = data;
    }

    pub fn template_defaults(&self) -> TemplateDefaults {
        self.state().templates.clone()
    }

    /// Override the default template and persona until the returned guard
    /// is dropped. `None` keeps the current value.
    pub fn template_scope(&self, template: Option<&str>, persona: Option<&str>) -> TemplateScope<'_> {
        let mut state = self.state();
        let previous = (state.templates.template.clone(), state.templates.persona.clone());
        if let Some(t) = template {
            state.templates.template = t.to_string();
        }
        if let Some(p) = persona {
            state.templates.persona = p.to_string();
        }
        TemplateScope {
            session: self,
            previous: Some(previous),
        }
    }

    /// Render a template, adopt the persona as system message and chat with
    /// the rendered text.
    ///
    /// `data` is merged over the persistent template data. `template` and
    /// `persona` default to the session defaults. In JSON mode a string reply
    /// is re-parsed into structured data when possible.
    pub async fn template_chat(
        &self,
        data: Option<&Map<String, Value>>,
        template: Option<&str>,
        persona: Option<&str>,
    ) -> Result<Value> {
        let _busy = self.acquire()?;

        let (prompt, persona) = {
            let state = self.state();
            let prompt = state.templates.render(template, data)?;
            let persona = persona
                .map(String::from)
                .unwrap_or_else(|| state.templates.persona.clone());
            (prompt, persona)
        };

        self.replace_system_message(Some(&persona));
        self.push_message(MessageRole::User, prompt);
        let value = self.run(&ChatOptions::default()).await?;

        if self.config.json_mode {
            let value = coerce_structured(value);
            self.state().last_response = Some(value.clone());
            return Ok(value);
        }
        Ok(value)
    }

    /// Load the default template from item `set`, field `instruction` of the
    /// prompt vault.
    pub async fn load_template_instruction(&self, set: &str, instruction: &str) -> Result<()> {
        let template = self.secrets.resolve(set, instruction, PROMPT_VAULT).await?;
        self.set_default_template(template);
        Ok(())
    }

    /// Load the default persona from item `persona`, field `persona` of the
    /// prompt vault.
    pub async fn load_template_persona(&self, persona: &str) -> Result<()> {
        let text = self.secrets.resolve("persona", persona, PROMPT_VAULT).await?;
        self.set_default_persona(text);
        Ok(())
    }
}
