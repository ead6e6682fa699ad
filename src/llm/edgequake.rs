//! Text generation through any `edgequake-llm` provider.
//!
//! ## Provider resolution
//!
//! 1. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
//!    when both are set and non-empty.
//! 2. **Full auto-detection** (`ProviderFactory::from_env`), which picks the
//!    first provider whose API key is present.
//!
//! If neither yields a provider the generator is still registered, but it
//! reports itself unavailable so the registry skips it.

use super::TextGenerator;
use crate::config::PipelineConfig;
use crate::error::ReceiptError;
use crate::registry::Provider;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const PROVIDER_NAME: &str = "edgequake";

/// Upper bound on the length of a structured answer.
const MAX_COMPLETION_TOKENS: usize = 2048;

pub struct EdgequakeGenerator {
    provider: Option<Arc<dyn LLMProvider>>,
    timeout: Duration,
}

impl EdgequakeGenerator {
    /// Wrap an already-built provider.
    pub fn with_provider(provider: Arc<dyn LLMProvider>, timeout: Duration) -> Self {
        Self {
            provider: Some(provider),
            timeout,
        }
    }

    /// Resolve a provider from the environment; unavailable if none is found.
    pub fn from_env(config: &PipelineConfig) -> Self {
        let provider = match resolve_env_provider() {
            Ok(p) => Some(p),
            Err(e) => {
                info!("edgequake text generator disabled: {}", e);
                None
            }
        };
        Self {
            provider,
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

/// Build an `edgequake-llm` provider from environment variables.
pub fn resolve_env_provider() -> Result<Arc<dyn LLMProvider>, ReceiptError> {
    if let (Ok(name), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !name.is_empty() && !model.is_empty() {
            return ProviderFactory::create_llm_provider(&name, &model).map_err(|e| {
                ReceiptError::llm(format!("Cannot create provider '{}': {}", name, e))
            });
        }
    }

    let (llm, _embedding) = ProviderFactory::from_env().map_err(|e| {
        ReceiptError::llm(format!(
            "No LLM provider could be auto-detected from environment: {}",
            e
        ))
    })?;
    Ok(llm)
}

#[async_trait]
impl Provider for EdgequakeGenerator {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn is_available(&self) -> bool {
        self.provider.is_some()
    }
}

#[async_trait]
impl TextGenerator for EdgequakeGenerator {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, ReceiptError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| ReceiptError::llm("No edgequake-llm provider configured"))?;

        let messages = vec![ChatMessage::user(prompt)];
        let options = CompletionOptions {
            temperature: Some(temperature),
            max_tokens: Some(MAX_COMPLETION_TOKENS),
            ..Default::default()
        };

        let response = tokio::time::timeout(self.timeout, provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| {
                ReceiptError::llm(format!(
                    "LLM request timed out after {}s",
                    self.timeout.as_secs_f32()
                ))
            })?
            .map_err(|e| ReceiptError::llm(e.to_string()))?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        if response.content.trim().is_empty() {
            return Err(ReceiptError::llm("Empty response from LLM provider"));
        }
        Ok(response.content)
    }
}
