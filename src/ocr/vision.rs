//! OCR by transcription with a vision-capable language model.
//!
//! Useful where Tesseract is not installed, and noticeably better on
//! crumpled or low-contrast thermal receipts. Each image is sent as a
//! lossless PNG with a transcription-only system prompt.

use super::{decode_image, extract_pdf_text, OcrProvider};
use crate::config::PipelineConfig;
use crate::error::ReceiptError;
use crate::llm::edgequake::resolve_env_provider;
use crate::pipeline::encode::{encode_png, to_image_data};
use crate::pipeline::render::RenderOptions;
use crate::prompts::VISION_OCR_PROMPT;
use crate::registry::Provider;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use image::DynamicImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const PROVIDER_NAME: &str = "vision";
const MAX_TRANSCRIPTION_TOKENS: usize = 4096;

pub struct VisionOcr {
    provider: Option<Arc<dyn LLMProvider>>,
    render: RenderOptions,
    page_concurrency: usize,
    timeout: Duration,
}

impl VisionOcr {
    pub fn with_provider(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider: Some(provider),
            render: RenderOptions::from(config),
            page_concurrency: config.page_concurrency,
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Auto-detect a provider from the environment; unavailable if none.
    pub fn from_env(config: &PipelineConfig) -> Self {
        let provider = match resolve_env_provider() {
            Ok(p) => Some(p),
            Err(e) => {
                info!("vision OCR disabled: {}", e);
                None
            }
        };
        Self {
            provider,
            render: RenderOptions::from(config),
            page_concurrency: config.page_concurrency,
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    async fn recognise(&self, img: DynamicImage) -> Result<String, ReceiptError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| ReceiptError::ocr("No vision model configured"))?;

        let png = encode_png(&img)?;
        let messages = vec![
            ChatMessage::system(VISION_OCR_PROMPT),
            ChatMessage::user_with_images("", vec![to_image_data(&png, "image/png")]),
        ];
        let options = CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(MAX_TRANSCRIPTION_TOKENS),
            ..Default::default()
        };

        let start = Instant::now();
        let response = tokio::time::timeout(self.timeout, provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| ReceiptError::ocr("Vision model timed out"))?
            .map_err(|e| ReceiptError::ocr(format!("Vision model failed: {}", e)))?;

        debug!(
            "Vision OCR: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content.trim().to_string())
    }
}

#[async_trait]
impl Provider for VisionOcr {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn is_available(&self) -> bool {
        self.provider.is_some()
    }
}

#[async_trait]
impl OcrProvider for VisionOcr {
    async fn extract_from_image(&self, bytes: &[u8]) -> Result<String, ReceiptError> {
        let img = decode_image(bytes)?;
        self.recognise(img).await
    }

    async fn extract_from_pdf(&self, bytes: &[u8]) -> Result<String, ReceiptError> {
        extract_pdf_text(bytes, self.render.clone(), self.page_concurrency, |img| {
            self.recognise(img)
        })
        .await
    }
}
