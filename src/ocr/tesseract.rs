//! Tesseract OCR via `leptess`.
//!
//! The native engine is only linked with the `tesseract` feature. Without it
//! the provider is still registered under its name, reports itself
//! unavailable, and every call fails with an [`ReceiptError::OcrFailure`], so
//! the registry falls through to the next provider.
//!
//! `LepTess` is neither `Send` nor cheap to share, so a fresh engine is built
//! inside `spawn_blocking` for each image.

use super::{decode_image, extract_pdf_text, OcrProvider};
use crate::config::PipelineConfig;
use crate::error::ReceiptError;
use crate::pipeline::encode::encode_png;
use crate::pipeline::render::RenderOptions;
use crate::registry::Provider;
use async_trait::async_trait;
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

const PROVIDER_NAME: &str = "tesseract";

/// Engine settings moved into each blocking task.
#[derive(Debug, Clone)]
#[cfg_attr(not(feature = "tesseract"), allow(dead_code))]
struct EngineSettings {
    tessdata_path: Option<PathBuf>,
    language: String,
}

pub struct TesseractOcr {
    settings: Arc<EngineSettings>,
    render: RenderOptions,
    page_concurrency: usize,
    available: OnceCell<bool>,
}

impl TesseractOcr {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            settings: Arc::new(EngineSettings {
                tessdata_path: config.tessdata_path.clone(),
                language: config.ocr_language.clone(),
            }),
            render: RenderOptions::from(config),
            page_concurrency: config.page_concurrency,
            available: OnceCell::new(),
        }
    }

    async fn recognise(&self, img: DynamicImage) -> Result<String, ReceiptError> {
        let settings = Arc::clone(&self.settings);
        tokio::task::spawn_blocking(move || {
            let png = encode_png(&img)?;
            engine::recognise_png(&settings, &png)
        })
        .await
        .map_err(|e| ReceiptError::Internal(format!("OCR task panicked: {}", e)))?
    }

    /// OCR a blank 10×10 image; any error means the engine is unusable.
    async fn self_test(&self) -> bool {
        let blank = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(10, 10, image::Luma([255])));
        match self.recognise(blank).await {
            Ok(_) => {
                debug!("Tesseract self-test passed");
                true
            }
            Err(e) => {
                warn!("Tesseract is not available: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Provider for TesseractOcr {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn is_available(&self) -> bool {
        *self.available.get_or_init(|| self.self_test()).await
    }
}

#[async_trait]
impl OcrProvider for TesseractOcr {
    async fn extract_from_image(&self, bytes: &[u8]) -> Result<String, ReceiptError> {
        let img = decode_image(bytes)?;
        let text = self.recognise(img).await?;
        debug!("Tesseract extracted {} chars from image", text.len());
        Ok(text)
    }

    async fn extract_from_pdf(&self, bytes: &[u8]) -> Result<String, ReceiptError> {
        extract_pdf_text(bytes, self.render.clone(), self.page_concurrency, |img| {
            self.recognise(img)
        })
        .await
    }
}

#[cfg(feature = "tesseract")]
mod engine {
    use super::EngineSettings;
    use crate::error::ReceiptError;
    use leptess::LepTess;

    pub(super) fn recognise_png(settings: &EngineSettings, png: &[u8]) -> Result<String, ReceiptError> {
        let data_path = settings.tessdata_path.as_deref().and_then(|p| p.to_str());
        let mut lt = LepTess::new(data_path, &settings.language)
            .map_err(|e| ReceiptError::ocr(format!("Tesseract init failed: {:?}", e)))?;
        lt.set_image_from_mem(png)
            .map_err(|e| ReceiptError::ocr(format!("Tesseract could not load image: {:?}", e)))?;
        lt.get_utf8_text()
            .map_err(|e| ReceiptError::ocr(format!("Tesseract returned invalid UTF-8: {}", e)))
    }
}

#[cfg(not(feature = "tesseract"))]
mod engine {
    use super::EngineSettings;
    use crate::error::ReceiptError;

    pub(super) fn recognise_png(_settings: &EngineSettings, _png: &[u8]) -> Result<String, ReceiptError> {
        Err(ReceiptError::ocr(
            "Tesseract support not compiled in; rebuild with --features tesseract",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn undecodable_bytes_fail_before_the_engine() {
        let ocr = TesseractOcr::from_config(&PipelineConfig::default());
        assert!(matches!(
            ocr.extract_from_image(b"\x00\x01garbage").await,
            Err(ReceiptError::OcrFailure { .. })
        ));
    }

    #[cfg(not(feature = "tesseract"))]
    #[tokio::test]
    async fn unavailable_without_the_feature() {
        let ocr = TesseractOcr::from_config(&PipelineConfig::default());
        assert!(!ocr.is_available().await);
    }

    #[cfg(feature = "tesseract")]
    #[tokio::test]
    async fn blank_image_yields_blank_text() {
        let ocr = TesseractOcr::from_config(&PipelineConfig::default());
        if !ocr.is_available().await {
            println!("SKIP — tesseract language data not installed");
            return;
        }
        let png = encode_png(&DynamicImage::new_rgb8(50, 50)).unwrap();
        let text = ocr.extract_from_image(&png).await.unwrap();
        assert!(text.trim().is_empty(), "got {text:?}");
    }
}
