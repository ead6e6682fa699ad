//! Configuration for the receipt extraction pipeline.
//!
//! Every knob the pipeline reads lives in [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`]. Providers, the rasteriser and the service all
//! take the same struct so a single value describes a deployment.

use crate::error::ReceiptError;
use std::fmt;
use std::path::PathBuf;

/// OpenRouter's OpenAI-compatible chat-completions endpoint.
pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Configuration for receipt extraction.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_receipt::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .default_ocr_provider("vision")
///     .llm_model("openai/gpt-4o-mini")
///     .request_timeout_secs(20)
///     .build()
///     .unwrap();
/// assert_eq!(config.pdf_dpi, 300);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Name of the OCR provider tried first. Default: `"tesseract"`.
    pub default_ocr_provider: String,

    /// Name of the text-generation provider tried first. Default: `"openrouter"`.
    pub default_llm_provider: String,

    /// Directory holding Tesseract `*.traineddata`. If None, Tesseract's
    /// compiled-in default (or `TESSDATA_PREFIX`) is used.
    pub tessdata_path: Option<PathBuf>,

    /// Tesseract language code(s), e.g. `"eng"` or `"eng+hin"`. Default: `"eng"`.
    pub ocr_language: String,

    /// API key for the OpenRouter generator. The generator reports itself
    /// unavailable when this is None or blank.
    pub llm_api_key: Option<String>,

    /// Model identifier sent to the text-generation provider.
    /// Default: `"openai/gpt-4o-mini"`.
    pub llm_model: String,

    /// Chat-completions endpoint for the OpenRouter generator.
    pub llm_base_url: String,

    /// Per-request timeout for language-model calls, in seconds. Default: 30.
    pub request_timeout_secs: u64,

    /// Rasterisation DPI for PDF pages. Default: 300.
    ///
    /// Receipts are printed in small thermal-printer fonts; below ~200 DPI
    /// Tesseract starts dropping decimal points and currency symbols.
    pub pdf_dpi: u32,

    /// Longest edge, in pixels, of a rendered PDF page. Default: 6000.
    ///
    /// Caps memory for unusually large pages (a 300 DPI A3 page is already
    /// ~5000 px tall).
    pub max_rendered_pixels: u32,

    /// How many PDF pages are recognised at once. Default: 1.
    ///
    /// Output order always follows page order regardless of this value.
    pub page_concurrency: usize,

    /// Directory containing the pdfium shared library. If None, the system
    /// library search path is used.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Root directory of the local file store. Default: `"upload-dir"`.
    pub storage_dir: PathBuf,

    /// Largest accepted upload in bytes. Default: 10 MiB.
    pub max_upload_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_ocr_provider: "tesseract".to_string(),
            default_llm_provider: "openrouter".to_string(),
            tessdata_path: None,
            ocr_language: "eng".to_string(),
            llm_api_key: None,
            llm_model: "openai/gpt-4o-mini".to_string(),
            llm_base_url: OPENROUTER_API_URL.to_string(),
            request_timeout_secs: 30,
            pdf_dpi: 300,
            max_rendered_pixels: 6000,
            page_concurrency: 1,
            pdfium_lib_path: None,
            storage_dir: PathBuf::from("upload-dir"),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("default_ocr_provider", &self.default_ocr_provider)
            .field("default_llm_provider", &self.default_llm_provider)
            .field("tessdata_path", &self.tessdata_path)
            .field("ocr_language", &self.ocr_language)
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "<redacted>"))
            .field("llm_model", &self.llm_model)
            .field("llm_base_url", &self.llm_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("pdf_dpi", &self.pdf_dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("page_concurrency", &self.page_concurrency)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("storage_dir", &self.storage_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// True when an OpenRouter key is present and non-blank.
    pub fn has_llm_api_key(&self) -> bool {
        self.llm_api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn default_ocr_provider(mut self, name: impl Into<String>) -> Self {
        self.config.default_ocr_provider = name.into();
        self
    }

    pub fn default_llm_provider(mut self, name: impl Into<String>) -> Self {
        self.config.default_llm_provider = name.into();
        self
    }

    pub fn tessdata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tessdata_path = Some(path.into());
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn llm_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.llm_api_key = Some(key.into());
        self
    }

    pub fn llm_model(mut self, model: impl Into<String>) -> Self {
        self.config.llm_model = model.into();
        self
    }

    pub fn llm_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.llm_base_url = url.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn pdf_dpi(mut self, dpi: u32) -> Self {
        self.config.pdf_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn page_concurrency(mut self, n: usize) -> Self {
        self.config.page_concurrency = n.max(1);
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn storage_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = path.into();
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ReceiptError> {
        let c = &self.config;
        if c.pdf_dpi < 72 || c.pdf_dpi > 600 {
            return Err(ReceiptError::InvalidConfig(format!(
                "PDF DPI must be 72–600, got {}",
                c.pdf_dpi
            )));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(ReceiptError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.llm_model.trim().is_empty() {
            return Err(ReceiptError::InvalidConfig(
                "LLM model must not be empty".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(ReceiptError::InvalidConfig(
                "Max upload size must be ≥ 1 byte".into(),
            ));
        }
        Ok(self.config)
    }
}
