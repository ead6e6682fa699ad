//! # edgequake-receipt
//!
//! Turn photographed or scanned receipts (JPEG, PNG, PDF) into structured
//! expense records using OCR and a language model.
//!
//! ## Why this crate?
//!
//! OCR alone gives you a wall of text where the total, the tax lines and the
//! item names are indistinguishable. Rule-based receipt parsers break on the
//! first unfamiliar layout. This crate lets an OCR engine do what it is good
//! at (pixels → characters) and a language model do what *it* is good at
//! (messy text → fields), and wraps both in a small state machine so every
//! receipt ends in an inspectable `COMPLETED` or `FAILED` state.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Input      validate type and size, store bytes, record PENDING
//!  ├─ 2. OCR        tesseract / vision model; PDFs rendered at 300 DPI
//!  ├─ 3. Normalize  ₹ misreads (¥, JPY, Rs., INR) → ₹
//!  ├─ 4. Parse      prompt → LLM (temperature 0.2) → JSON → validation
//!  └─ 5. Persist    COMPLETED with fields and items, or FAILED with a reason
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_receipt::{PipelineConfig, ReceiptService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // OPENROUTER_API_KEY is read by the CLI; libraries pass it explicitly.
//!     let config = PipelineConfig::builder()
//!         .llm_api_key(std::env::var("OPENROUTER_API_KEY")?)
//!         .build()?;
//!     let service = ReceiptService::from_config(&config);
//!
//!     let bytes = std::fs::read("receipt.jpg")?;
//!     let record = service.upload("me@example.com", &bytes, "receipt.jpg", None).await?;
//!     println!("{} → {} {}", record.status(), record.merchant_name, record.total_amount);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature     | Default | Description |
//! |-------------|---------|-------------|
//! | `cli`       | on      | Enables the `receipt2json` binary (clap + anyhow + tracing-subscriber) |
//! | `tesseract` | off     | Links libtesseract via `leptess` for the `tesseract` OCR provider |
//!
//! Without `tesseract` the OCR registry falls back to the `vision` provider,
//! which needs an `edgequake-llm` API key (e.g. `OPENAI_API_KEY`).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod llm;
pub mod ocr;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod registry;
pub mod repository;
pub mod service;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{Capability, PageError, ReceiptError};
pub use llm::TextGenerator;
pub use ocr::OcrProvider;
pub use pipeline::normalize::normalize_currency;
pub use pipeline::parse::{ReceiptParser, PARSING_TEMPERATURE};
pub use progress::{NoopObserver, PipelineObserver, Stage};
pub use prompts::build_receipt_prompt;
pub use record::{
    FileMetadata, LineItem, ParsedItem, ParsingResult, ProcessingStatus, ReceiptRecord,
};
pub use registry::{Provider, ProviderRegistry};
pub use repository::{InMemoryReceiptRepository, JsonDirRepository, ReceiptRepository};
pub use service::ReceiptService;
pub use store::{FileStore, LocalFileStore};
