//! Supported providers and their static connection facts.

use crate::drivers::{AnthropicDriver, OpenAiDriver, ProviderDriver};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Minimum normalized similarity for a "did you mean" suggestion.
const SUGGESTION_CUTOFF: f64 = 0.6;

/// Vault holding provider API keys.
pub const API_VAULT: &str = "API";

/// A hosted LLM vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAI,
    Anthropic,
    #[serde(rename = "openrouter")]
    OpenRouter,
    Groq,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::OpenAI,
        Provider::Anthropic,
        Provider::OpenRouter,
        Provider::Groq,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
            Provider::OpenRouter => "openrouter",
            Provider::Groq => "groq",
        }
    }

    pub fn supported_names() -> Vec<&'static str> {
        Self::ALL.iter().map(Provider::id).collect()
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAI => "gpt-4o",
            Provider::Anthropic => "claude-3-5-sonnet-20240620",
            Provider::OpenRouter => "meta-llama/llama-3.1-405b-instruct",
            Provider::Groq => "llama-3.1-8b-instant",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::Groq => "https://api.groq.com/openai/v1",
        }
    }

    /// Token ceiling used when the caller does not override `max_tokens`.
    pub fn default_max_tokens(&self) -> u32 {
        match self {
            Provider::Anthropic => 8192,
            _ => 4000,
        }
    }

    /// Environment variable consulted before the vault.
    pub fn api_key_env_var(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
        }
    }

    /// `(item, field)` of the API key inside [`API_VAULT`].
    pub fn vault_item(&self) -> (&'static str, &'static str) {
        match self {
            Provider::OpenAI => ("OPEN-AI", "Cursor"),
            Provider::Anthropic => ("Anthropic", "Cursor"),
            Provider::OpenRouter => ("OpenRouter", "Cursor"),
            Provider::Groq => ("Groq", "Promptsys"),
        }
    }

    /// Whether the provider can be asked to emit strict JSON
    /// (`response_format: json_object`).
    pub fn enforces_json_mode(&self) -> bool {
        matches!(self, Provider::OpenAI)
    }

    /// Build the wire-shape driver for this provider.
    pub fn driver(&self) -> Box<dyn ProviderDriver> {
        match self {
            Provider::Anthropic => Box::new(AnthropicDriver::new()),
            other => Box::new(OpenAiDriver::new(*other)),
        }
    }

    /// Closest supported provider name, if any is similar enough.
    pub fn suggest(name: &str) -> Option<&'static str> {
        let name = name.trim().to_lowercase();
        Self::ALL
            .iter()
            .map(|p| (p.id(), strsim::normalized_levenshtein(&name, p.id())))
            .filter(|(_, score)| *score >= SUGGESTION_CUTOFF)
            .fold(None, |best: Option<(&'static str, f64)>, (id, score)| match best {
                Some((_, s)) if s >= score => best,
                _ => Some((id, score)),
            })
            .map(|(id, _)| id)
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.id() == normalized)
            .ok_or_else(|| Error::UnsupportedProvider {
                name: normalized.clone(),
                suggestion: Self::suggest(&normalized).map(String::from),
            })
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
