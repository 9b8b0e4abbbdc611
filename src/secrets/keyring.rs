//! OS keyring backed secrets.

use async_trait::async_trait;

use super::{not_found, SecretProvider};
use crate::Result;

/// Looks secrets up in the platform keyring.
///
/// Entries are stored under service `{prefix}{vault}` and user `{item}/{field}`.
#[derive(Debug, Clone, Default)]
pub struct KeyringSecretProvider {
    service_prefix: String,
}

impl KeyringSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.service_prefix = prefix.into();
        self
    }

    pub fn service_name(&self, vault: &str) -> String {
        format!("{}{}", self.service_prefix, vault)
    }

    pub fn user_name(item: &str, field: &str) -> String {
        format!("{}/{}", item, field)
    }
}

#[async_trait]
impl SecretProvider for KeyringSecretProvider {
    async fn resolve(&self, item: &str, field: &str, vault: &str) -> Result<String> {
        let service = self.service_name(vault);
        let user = Self::user_name(item, field);

        // keyring calls block on platform IPC
        let lookup = tokio::task::spawn_blocking(move || {
            ::keyring::Entry::new(&service, &user).and_then(|entry| entry.get_password())
        })
        .await;

        match lookup {
            Ok(Ok(secret)) => Ok(secret),
            Ok(Err(::keyring::Error::NoEntry)) => {
                Err(not_found(item, field, vault, "no keyring entry"))
            }
            Ok(Err(e)) => Err(not_found(item, field, vault, format!("keyring error: {}", e))),
            Err(e) => Err(not_found(
                item,
                field,
                vault,
                format!("keyring lookup panicked: {}", e),
            )),
        }
    }
}
