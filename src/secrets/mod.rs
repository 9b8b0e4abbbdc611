//! Credential resolution.
//!
//! A session never reads credentials directly; it asks an injected
//! [`SecretProvider`] for `(item, field, vault)`. The default chain checks
//! environment variables first and the OS keyring second.

mod keyring;

pub use self::keyring::KeyringSecretProvider;

use async_trait::async_trait;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tracing::debug;

use crate::provider::{Provider, API_VAULT};
use crate::{Error, Result};

/// Vault holding prompt templates and personas.
pub const PROMPT_VAULT: &str = "Promptsys";

#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Resolve one secret field. Failures are [`Error::SecretResolution`].
    async fn resolve(&self, item: &str, field: &str, vault: &str) -> Result<String>;
}

pub(crate) fn not_found(item: &str, field: &str, vault: &str, message: impl Into<String>) -> Error {
    Error::SecretResolution {
        item: item.to_string(),
        field: field.to_string(),
        vault: vault.to_string(),
        message: message.into(),
    }
}

/// Environment variable name used for any `(vault, item, field)` without an
/// explicit mapping, e.g. `INTELISYS_SECRET_PROMPTSYS_PERSONA_PERSONA`.
pub fn fallback_env_var(item: &str, field: &str, vault: &str) -> String {
    let sanitize = |s: &str| -> String {
        s.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    };
    format!(
        "INTELISYS_SECRET_{}_{}_{}",
        sanitize(vault),
        sanitize(item),
        sanitize(field)
    )
}

/// Reads secrets from environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretProvider {
    mapping: HashMap<(String, String, String), String>,
}

impl EnvSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps every provider's API key item to its conventional env var
    /// (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, ...).
    pub fn for_providers() -> Self {
        Provider::ALL.iter().fold(Self::new(), |acc, p| {
            let (item, field) = p.vault_item();
            acc.with_mapping(item, field, API_VAULT, p.api_key_env_var())
        })
    }

    pub fn with_mapping(
        mut self,
        item: impl Into<String>,
        field: impl Into<String>,
        vault: impl Into<String>,
        env_var: impl Into<String>,
    ) -> Self {
        self.mapping
            .insert((item.into(), field.into(), vault.into()), env_var.into());
        self
    }

    fn var_name(&self, item: &str, field: &str, vault: &str) -> String {
        self.mapping
            .get(&(item.to_string(), field.to_string(), vault.to_string()))
            .cloned()
            .unwrap_or_else(|| fallback_env_var(item, field, vault))
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn resolve(&self, item: &str, field: &str, vault: &str) -> Result<String> {
        let var = self.var_name(item, field, vault);
        match env::var(&var) {
            Ok(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(not_found(item, field, vault, format!("{} is not set", var))),
        }
    }
}

/// In-memory secrets.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretProvider {
    secrets: HashMap<(String, String, String), String>,
}

impl StaticSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(
        mut self,
        item: impl Into<String>,
        field: impl Into<String>,
        vault: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        self.secrets
            .insert((item.into(), field.into(), vault.into()), secret.into());
        self
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn resolve(&self, item: &str, field: &str, vault: &str) -> Result<String> {
        self.secrets
            .get(&(item.to_string(), field.to_string(), vault.to_string()))
            .cloned()
            .ok_or_else(|| not_found(item, field, vault, "no such secret"))
    }
}

/// Tries each provider in order; the first success wins.
#[derive(Clone, Default)]
pub struct ChainSecretProvider {
    providers: Vec<Arc<dyn SecretProvider>>,
}

impl ChainSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn SecretProvider>) -> Self {
        self.providers.push(provider);
        self
    }
}

impl std::fmt::Debug for ChainSecretProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainSecretProvider")
            .field("providers", &self.providers.len())
            .finish()
    }
}

#[async_trait]
impl SecretProvider for ChainSecretProvider {
    async fn resolve(&self, item: &str, field: &str, vault: &str) -> Result<String> {
        let mut failures = Vec::new();
        for provider in &self.providers {
            match provider.resolve(item, field, vault).await {
                Ok(secret) => return Ok(secret),
                Err(Error::SecretResolution { message, .. }) => {
                    debug!(item, field, vault, reason = %message, "secret source missed");
                    failures.push(message);
                }
                Err(other) => return Err(other),
            }
        }
        let message = if failures.is_empty() {
            "no secret sources configured".to_string()
        } else {
            failures.join("; ")
        };
        Err(not_found(item, field, vault, message))
    }
}

/// Environment variables first, then the OS keyring.
pub fn default_secret_provider() -> Arc<dyn SecretProvider> {
    Arc::new(
        ChainSecretProvider::new()
            .with(Arc::new(EnvSecretProvider::for_providers()))
            .with(Arc::new(KeyringSecretProvider::new())),
    )
}
