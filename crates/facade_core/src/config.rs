//! Façade configuration.
//!
//! # Invariants
//! - `query_alias` is a plain SQL identifier.
//! - `not_found_message` is never empty.

use crate::query::is_valid_field_name;
use serde::{Deserialize, Serialize};

pub const DEFAULT_QUERY_ALIAS: &str = "t";
pub const DEFAULT_NOT_FOUND_MESSAGE: &str = "Record not found";

/// What `flush(Some(entity))` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Only the given entity's pending changes.
    #[default]
    PerEntity,
    /// Every pending change of the session; the entity argument is ignored.
    Everything,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid façade configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("query alias `{0}` is not a valid identifier")]
    InvalidAlias(String),
    #[error("not-found message cannot be empty")]
    EmptyNotFoundMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacadeConfig {
    pub flush_policy: FlushPolicy,
    /// Payload of 404 failures.
    pub not_found_message: String,
    /// Alias naming the collection in builders returned by `query()`.
    pub query_alias: String,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            flush_policy: FlushPolicy::default(),
            not_found_message: DEFAULT_NOT_FOUND_MESSAGE.to_string(),
            query_alias: DEFAULT_QUERY_ALIAS.to_string(),
        }
    }
}

impl FacadeConfig {
    /// Parses a JSON config; missing keys keep their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_field_name(&self.query_alias) {
            return Err(ConfigError::InvalidAlias(self.query_alias.clone()));
        }
        if self.not_found_message.trim().is_empty() {
            return Err(ConfigError::EmptyNotFoundMessage);
        }
        Ok(())
    }

    pub fn with_flush_policy(mut self, flush_policy: FlushPolicy) -> Self {
        self.flush_policy = flush_policy;
        self
    }

    pub fn with_not_found_message(mut self, message: impl Into<String>) -> Self {
        self.not_found_message = message.into();
        self
    }

    pub fn with_query_alias(mut self, alias: impl Into<String>) -> Self {
        self.query_alias = alias.into();
        self
    }
}
