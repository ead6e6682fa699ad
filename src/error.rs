//! Error types for the edgequake-receipt library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ReceiptError`] — **Fatal** for the operation that returned it: bad
//!   input, no usable provider, an OCR engine or language-model failure.
//!   Inside [`crate::service::ReceiptService::process`] every stage failure is
//!   converted into a persisted `FAILED` record instead of being returned, so
//!   callers of the pipeline only ever see `NotFound` here.
//!
//! * [`PageError`] — **Non-fatal**: a single PDF page could not be rendered
//!   or recognised. It is logged and that page contributes no text; the other
//!   pages of the document are still extracted.

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Provider family that failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Ocr,
    TextGeneration,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Ocr => f.write_str("OCR"),
            Capability::TextGeneration => f.write_str("text-generation"),
        }
    }
}

/// All fatal errors returned by the edgequake-receipt library.
#[derive(Debug, Error)]
pub enum ReceiptError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Bad or missing input to a synchronous helper (blank OCR text, empty
    /// upload, unsupported content type). Never retried.
    #[error("Validation failed: {0}")]
    Validation(String),

    // ── Provider errors ───────────────────────────────────────────────────
    /// No registered provider of this family reports itself available.
    #[error("No {capability} provider is available. Registered: [{registered}]")]
    ProviderUnavailable {
        capability: Capability,
        registered: String,
    },

    /// The OCR engine failed, or the bytes could not be decoded.
    #[error("OCR failed: {detail}")]
    OcrFailure {
        detail: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Network error, timeout, or a malformed / incomplete model response.
    #[error("LLM failed: {detail}")]
    LlmFailure { detail: String },

    // ── Collaborator errors ───────────────────────────────────────────────
    /// No receipt with this id exists in the repository.
    #[error("Receipt {id} not found")]
    NotFound { id: Uuid },

    /// The file store or repository failed.
    #[error("Storage error: {detail}")]
    Storage {
        detail: String,
        #[source]
        source: Option<BoxError>,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, runtime failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReceiptError {
    pub fn ocr(detail: impl Into<String>) -> Self {
        ReceiptError::OcrFailure {
            detail: detail.into(),
            source: None,
        }
    }

    pub fn ocr_with(detail: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ReceiptError::OcrFailure {
            detail: detail.into(),
            source: Some(source.into()),
        }
    }

    pub fn llm(detail: impl Into<String>) -> Self {
        ReceiptError::LlmFailure {
            detail: detail.into(),
        }
    }

    pub fn storage(detail: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ReceiptError::Storage {
            detail: detail.into(),
            source: Some(source.into()),
        }
    }
}

/// A non-fatal error for a single PDF page.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The OCR engine failed on an otherwise rendered page.
    #[error("Page {page}: OCR failed: {detail}")]
    OcrFailed { page: usize, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_unavailable_display() {
        let e = ReceiptError::ProviderUnavailable {
            capability: Capability::Ocr,
            registered: "tesseract, vision".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("OCR"), "got: {msg}");
        assert!(msg.contains("tesseract, vision"), "got: {msg}");
    }

    #[test]
    fn ocr_failure_keeps_source() {
        let io = std::io::Error::other("engine crashed");
        let e = ReceiptError::ocr_with("could not run tesseract", io);
        assert!(e.to_string().contains("could not run tesseract"));
        let source = std::error::Error::source(&e).expect("source is kept");
        assert!(source.to_string().contains("engine crashed"));
    }

    #[test]
    fn not_found_display() {
        let id = Uuid::nil();
        let e = ReceiptError::NotFound { id };
        assert!(e.to_string().contains(&id.to_string()));
    }

    #[test]
    fn page_error_display() {
        let e = PageError::OcrFailed {
            page: 3,
            detail: "bad pix".into(),
        };
        assert!(e.to_string().contains("Page 3"));
        assert!(e.to_string().contains("bad pix"));
    }
}
