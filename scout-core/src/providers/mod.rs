//! Reasoning capability implementations.
//!
//! Use [`create_provider`] to build the provider named in the config.

pub mod anthropic;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::sync::Arc;

pub use anthropic::AnthropicProvider;

/// Build the provider selected by `config.provider`.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.to_ascii_lowercase().as_str() {
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(config)?)),
        other => Err(LlmError::ApiRequest {
            message: format!("Unsupported provider '{other}'"),
        }),
    }
}
