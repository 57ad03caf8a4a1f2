// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Secret storage behind the `secure:*` channels.

use crate::bridge::{args, BridgeClient, BridgeError, Channel};

use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Mutex, PoisonError},
};
use tracing::debug;

/// Keyring service every token is filed under.
pub const SERVICE: &str = "reqtrace";

/// Key of the token used for git remotes.
pub const GIT_TOKEN_KEY: &str = "git";

/// Host side token store.
pub trait TokenVault: Debug + Send + Sync {
    fn set(&self, key: &str, token: &str) -> Result<()>;

    /// Stored token, `None` if nothing is stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Forget token. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Tokens kept by the operating system's credential store.
#[derive(Debug, Clone)]
pub struct KeyringVault {
    service: String,
}

impl KeyringVault {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        Ok(keyring::Entry::new(&self.service, key)?)
    }
}

impl Default for KeyringVault {
    fn default() -> Self {
        Self::new(SERVICE)
    }
}

impl TokenVault for KeyringVault {
    fn set(&self, key: &str, token: &str) -> Result<()> {
        self.entry(key)?.set_password(token)?;
        debug!("stored token {key} in keyring");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Tokens kept in process memory, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryVault {
    tokens: Mutex<HashMap<String, String>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn tokens(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // INVARIANT: Map operations never panic midway.
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TokenVault for MemoryVault {
    fn set(&self, key: &str, token: &str) -> Result<()> {
        self.tokens().insert(key.to_string(), token.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.tokens().get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.tokens().remove(key);
        Ok(())
    }
}

/// Renderer side access to the host's vault.
#[derive(Debug, Clone)]
pub struct TokenClient {
    bridge: BridgeClient,
}

impl TokenClient {
    pub fn new(bridge: BridgeClient) -> Self {
        Self { bridge }
    }

    pub async fn set_token(&self, key: &str, token: &str) -> Result<(), BridgeError> {
        let args = args::Token {
            key: key.to_string(),
            token: Some(token.to_string()),
        };
        self.bridge.call(Channel::SecureSetToken, &args).await
    }

    pub async fn get_token(&self, key: &str) -> Result<Option<String>, BridgeError> {
        let args = args::Token {
            key: key.to_string(),
            token: None,
        };
        self.bridge.call(Channel::SecureGetToken, &args).await
    }

    pub async fn remove_token(&self, key: &str) -> Result<(), BridgeError> {
        let args = args::Token {
            key: key.to_string(),
            token: None,
        };
        self.bridge.call(Channel::SecureRemoveToken, &args).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error(transparent)]
    Keyring(#[from] keyring::Error),
}

/// Friendly result alias :3
pub type Result<T, E = VaultError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn memory_vault_forgets_removed_tokens() -> anyhow::Result<()> {
        let vault = MemoryVault::new();
        assert_eq!(vault.get(GIT_TOKEN_KEY)?, None);

        vault.set(GIT_TOKEN_KEY, "ghp_secret")?;
        assert_eq!(vault.get(GIT_TOKEN_KEY)?.as_deref(), Some("ghp_secret"));

        vault.remove(GIT_TOKEN_KEY)?;
        vault.remove(GIT_TOKEN_KEY)?;
        assert_eq!(vault.get(GIT_TOKEN_KEY)?, None);

        Ok(())
    }
}
