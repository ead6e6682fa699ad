//! Pipeline stages for receipt extraction.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ OCR ──▶ normalize ──▶ parse ──▶ record
//! (bytes)   (pdfium)   (PNG)   (provider) (₹ rules)   (LLM+JSON)
//! ```
//!
//! 1. [`input`]     — validate uploads and sniff their content type
//! 2. [`render`]    — rasterise PDF pages at a fixed DPI; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]    — PNG-encode page images for OCR engines and vision models
//! 4. [`normalize`] — deterministic currency-symbol fixes on OCR text
//! 5. [`postprocess`] — strip fences and junk from raw model output
//! 6. [`parse`]     — prompt the model, deserialise and validate its JSON

pub mod encode;
pub mod input;
pub mod normalize;
pub mod parse;
pub mod postprocess;
pub mod render;
