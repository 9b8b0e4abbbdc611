//! Prompt templates rendered with MiniJinja.

use minijinja::Environment;
use serde_json::{Map, Value};

use crate::session::SessionBuilder;
use crate::structured::repair_parse;
use crate::{Error, Result};

pub const DEFAULT_TEMPLATE: &str = "{{ prompt }}";
pub const DEFAULT_PERSONA: &str = "You are a helpful assistant.";

/// Persistent template state of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDefaults {
    pub template: String,
    pub persona: String,
    /// Data merged under every render; per-call data wins on collisions.
    pub data: Map<String, Value>,
}

impl Default for TemplateDefaults {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            persona: DEFAULT_PERSONA.to_string(),
            data: Map::new(),
        }
    }
}

impl TemplateDefaults {
    /// Persistent data overlaid with `call_data`.
    pub fn merged_data(&self, call_data: Option<&Map<String, Value>>) -> Map<String, Value> {
        let mut merged = self.data.clone();
        if let Some(call_data) = call_data {
            for (k, v) in call_data {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    /// Render `template` (or the default one) with the merged data.
    pub fn render(
        &self,
        template: Option<&str>,
        call_data: Option<&Map<String, Value>>,
    ) -> Result<String> {
        let source = template.unwrap_or(&self.template);
        render(source, &self.merged_data(call_data))
    }
}

/// Render a template string against `data`.
pub fn render(source: &str, data: &Map<String, Value>) -> Result<String> {
    let env = Environment::new();
    env.render_str(source, data)
        .map_err(|e| Error::InvalidTemplate(e.to_string()))
}

/// One-shot templated request.
///
/// Renders `template` with `data`, builds a fresh session from `builder` with
/// `persona` as its system message and returns the reply text. The template is
/// rendered before the session is built, so a bad template never resolves a
/// key or sends a request.
pub async fn template_api(
    builder: SessionBuilder,
    template: &str,
    data: &Map<String, Value>,
    persona: &str,
) -> Result<String> {
    let prompt = render(template, data)?;
    let session = builder.system_message(persona).build().await?;
    Ok(match session.chat(&prompt).await? {
        Value::String(text) => text,
        other => other.to_string(),
    })
}

/// Like [`template_api`], but parses the reply as JSON. Markdown fences and
/// Python-literal dicts are accepted.
pub async fn template_api_json(
    builder: SessionBuilder,
    template: &str,
    data: &Map<String, Value>,
    persona: &str,
) -> Result<Value> {
    let text = template_api(builder, template, data, persona).await?;
    repair_parse(&text).ok_or_else(|| Error::json_parse("templated response is not JSON", text))
}
