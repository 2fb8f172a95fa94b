//! Credential loading for the LLM endpoint and the CRM backend.
//!
//! All credentials are resolved once at startup from the environment variable
//! names configured in `[llm]` and `[crm]`, and then passed by value into the
//! clients that need them. Core logic never reads the environment itself.
//!
//! ## Security Properties
//!
//! - All secret values implement `Zeroize` and are cleared on drop.
//! - Secret values are redacted in `Debug` output (shown as `[REDACTED]`).
//! - Nothing in this module logs or displays secret values.

use std::fmt;

use crmpilot_config::AppConfig;
use zeroize::Zeroize;

/// A single secret value with automatic zeroization.
#[derive(Clone)]
pub struct SecretValue {
    inner: String,
}

impl SecretValue {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// Get the secret value as a string slice.
    ///
    /// Only HTTP clients building an auth header or form should call this.
    pub fn expose(&self) -> &str {
        &self.inner
    }

    /// Get the secret value length (without exposing the value).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the secret value is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("inner", &"[REDACTED]")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl Drop for SecretValue {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

/// Errors from credential resolution. Any of these aborts startup.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("required environment variable '{name}' is not set or empty")]
    Missing { name: String },
}

/// Every credential the process needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Bearer key for the chat-completions endpoint.
    pub llm_api_key: SecretValue,
    /// Long-lived OAuth refresh token for the CRM.
    pub refresh_token: SecretValue,
    pub client_id: SecretValue,
    pub client_secret: SecretValue,
    /// API key for the mail-sending function.
    pub mail_api_key: SecretValue,
}

impl Credentials {
    /// Resolve all credentials from the process environment.
    pub fn from_env(config: &AppConfig) -> Result<Self, SecretError> {
        Self::from_lookup(config, |name| std::env::var(name).ok())
    }

    /// Resolve all credentials through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(
        config: &AppConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SecretError> {
        let fetch = |name: &str| -> Result<SecretValue, SecretError> {
            match lookup(name) {
                Some(value) if !value.trim().is_empty() => Ok(SecretValue::new(value.trim())),
                _ => Err(SecretError::Missing {
                    name: name.to_string(),
                }),
            }
        };

        Ok(Self {
            llm_api_key: fetch(&config.llm.api_key_env)?,
            refresh_token: fetch(&config.crm.refresh_token_env)?,
            client_id: fetch(&config.crm.client_id_env)?,
            client_secret: fetch(&config.crm.client_secret_env)?,
            mail_api_key: fetch(&config.crm.mail_api_key_env)?,
        })
    }
}
