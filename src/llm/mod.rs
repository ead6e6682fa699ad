//! Text-generation providers.
//!
//! The structured parser only needs "prompt in, text out" at a given
//! temperature, so that is the whole [`TextGenerator`] contract. Two
//! implementations ship with the crate:
//!
//! | name         | transport                              | available when            |
//! |--------------|----------------------------------------|---------------------------|
//! | `openrouter` | reqwest → OpenRouter chat-completions  | an API key is configured  |
//! | `edgequake`  | any `edgequake-llm` provider           | a provider could be built |
//!
//! Every failure, including a timeout, is a [`ReceiptError::LlmFailure`].

pub mod edgequake;
pub mod openrouter;

pub use edgequake::EdgequakeGenerator;
pub use openrouter::OpenRouterGenerator;

use crate::config::PipelineConfig;
use crate::error::{Capability, ReceiptError};
use crate::registry::{Provider, ProviderRegistry};
use async_trait::async_trait;
use std::sync::Arc;

/// A backend that completes a single prompt.
#[async_trait]
pub trait TextGenerator: Provider {
    /// Complete `prompt`. The returned text is the raw model output.
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, ReceiptError>;
}

/// Build the text-generation registry for `config`: OpenRouter first, then
/// whatever `edgequake-llm` can auto-detect from the environment.
pub fn default_generators(config: &PipelineConfig) -> ProviderRegistry<dyn TextGenerator> {
    let generators: Vec<Arc<dyn TextGenerator>> = vec![
        Arc::new(OpenRouterGenerator::from_config(config)),
        Arc::new(EdgequakeGenerator::from_env(config)),
    ];
    ProviderRegistry::new(
        Capability::TextGeneration,
        generators,
        config.default_llm_provider.clone(),
    )
}
