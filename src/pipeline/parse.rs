//! Structured parsing: OCR text → validated [`ParsingResult`].
//!
//! ## Steps
//!
//! 1. Render the extraction prompt ([`build_receipt_prompt`]); blank text is
//!    a [`ReceiptError::Validation`] for the caller.
//! 2. Resolve the default text-generation provider from the registry.
//! 3. Generate at [`PARSING_TEMPERATURE`].
//! 4. Clean the response ([`clean_model_output`]).
//! 5. Deserialise into a permissive DTO where every field is optional.
//! 6. Validate into a [`ParsingResult`]; anything missing or contradictory is
//!    an [`ReceiptError::LlmFailure`].
//!
//! ## Why a permissive DTO?
//!
//! A response such as `{"merchantName": "X"}` is valid JSON but an unusable
//! receipt. Deserialising straight into `ParsingResult` would report that as
//! a serde error with no indication of *which* business rule failed. Reading
//! into all-`Option` fields first lets step 6 name the missing field.

use crate::error::ReceiptError;
use crate::llm::TextGenerator;
use crate::pipeline::postprocess::clean_model_output;
use crate::prompts::{build_receipt_prompt, NOT_A_RECEIPT};
use crate::record::{ParsedItem, ParsingResult, ReceiptRecord};
use crate::registry::ProviderRegistry;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Sampling temperature for extraction. Low, to favour repeatable answers.
pub const PARSING_TEMPERATURE: f32 = 0.2;

/// Maps OCR text to a [`ParsingResult`] through a text-generation provider.
#[derive(Clone)]
pub struct ReceiptParser {
    generators: Arc<ProviderRegistry<dyn TextGenerator>>,
}

impl ReceiptParser {
    pub fn new(generators: Arc<ProviderRegistry<dyn TextGenerator>>) -> Self {
        Self { generators }
    }

    pub fn generators(&self) -> &ProviderRegistry<dyn TextGenerator> {
        &self.generators
    }

    /// Extract a validated result from `ocr_text`.
    ///
    /// # Errors
    /// - [`ReceiptError::Validation`] if `ocr_text` is blank
    /// - [`ReceiptError::ProviderUnavailable`] if no generator is available
    /// - [`ReceiptError::LlmFailure`] for transport errors, timeouts,
    ///   malformed JSON, missing required fields, or a non-receipt document
    pub async fn parse(&self, ocr_text: &str) -> Result<ParsingResult, ReceiptError> {
        let prompt = build_receipt_prompt(ocr_text)?;
        let generator = self.generators.resolve_default().await?;

        let start = Instant::now();
        let raw = generator.generate(&prompt, PARSING_TEMPERATURE).await?;
        info!(
            "'{}' answered in {}ms ({} chars)",
            generator.provider_name(),
            start.elapsed().as_millis(),
            raw.len()
        );

        let cleaned = clean_model_output(&raw);
        let dto: RawParsingResult = serde_json::from_str(&cleaned).map_err(|e| {
            debug!("Unparseable model response: {}", cleaned);
            ReceiptError::llm(format!("Response is not valid receipt JSON: {}", e))
        })?;

        validate(dto)
    }

    /// Overwrite `record`'s extracted fields with `result`.
    pub fn apply_result(record: &mut ReceiptRecord, result: &ParsingResult) {
        record.apply_result(result);
    }
}

// ── Wire shape of the model's answer ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParsingResult {
    merchant_name: Option<String>,
    total_amount: Option<Decimal>,
    receipt_date: Option<String>,
    tax_amount: Option<Decimal>,
    currency: Option<String>,
    items: Option<Vec<RawItem>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    item_name: Option<String>,
    quantity: Option<Decimal>,
    price: Option<Decimal>,
}

// ── Validation ───────────────────────────────────────────────────────────────

fn validate(dto: RawParsingResult) -> Result<ParsingResult, ReceiptError> {
    let merchant_name = dto
        .merchant_name
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ReceiptError::llm("Response is missing merchantName"))?;

    if merchant_name.eq_ignore_ascii_case(NOT_A_RECEIPT) {
        return Err(ReceiptError::llm("Document is not a receipt"));
    }

    let total_amount = dto
        .total_amount
        .ok_or_else(|| ReceiptError::llm("Response is missing totalAmount"))?;
    if total_amount.is_sign_negative() {
        return Err(ReceiptError::llm(format!(
            "totalAmount must not be negative, got {}",
            total_amount
        )));
    }

    let date_text = dto
        .receipt_date
        .ok_or_else(|| ReceiptError::llm("Response is missing receiptDate"))?;
    let receipt_date = NaiveDate::parse_from_str(date_text.trim(), "%Y-%m-%d").map_err(|e| {
        ReceiptError::llm(format!("receiptDate '{}' is not YYYY-MM-DD: {}", date_text, e))
    })?;

    if let Some(tax) = dto.tax_amount {
        if tax.is_sign_negative() {
            return Err(ReceiptError::llm(format!(
                "taxAmount must not be negative, got {}",
                tax
            )));
        }
    }

    let currency = dto.currency.and_then(|c| {
        let code = c.trim().to_ascii_uppercase();
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_alphabetic()) {
            Some(code)
        } else {
            warn!("Ignoring invalid currency code '{}'", c);
            None
        }
    });

    let items = dto
        .items
        .unwrap_or_default()
        .into_iter()
        .filter_map(validate_item)
        .collect();

    Ok(ParsingResult {
        merchant_name,
        total_amount,
        receipt_date,
        tax_amount: dto.tax_amount,
        currency,
        items,
    })
}

/// Items without a readable name are dropped; quantity defaults to 1.
fn validate_item(raw: RawItem) -> Option<ParsedItem> {
    let item_name = raw.item_name?.trim().to_string();
    if item_name.is_empty() {
        return None;
    }
    let quantity = raw
        .quantity
        .and_then(|q| q.round().to_u32())
        .filter(|&q| q > 0)
        .unwrap_or(1);
    Some(ParsedItem {
        item_name,
        quantity,
        price: raw.price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Capability;
    use crate::registry::Provider;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        reply: Result<String, String>,
        calls: Mutex<Vec<(String, f32)>>,
    }

    #[async_trait]
    impl Provider for Canned {
        fn provider_name(&self) -> &str {
            "canned"
        }
        async fn is_available(&self) -> bool {
            true
        }
    }

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, ReceiptError> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), temperature));
            self.reply.clone().map_err(ReceiptError::llm)
        }
    }

    fn parser_replying(reply: Result<&str, &str>) -> (ReceiptParser, Arc<Canned>) {
        let canned = Arc::new(Canned {
            reply: reply.map(str::to_string).map_err(str::to_string),
            calls: Mutex::new(Vec::new()),
        });
        let generators: Vec<Arc<dyn TextGenerator>> = vec![canned.clone()];
        let registry = ProviderRegistry::new(Capability::TextGeneration, generators, "canned");
        (ReceiptParser::new(Arc::new(registry)), canned)
    }

    const FULL: &str = r#"{
        "merchantName": "Store ABC",
        "totalAmount": 150.00,
        "receiptDate": "2024-12-16",
        "taxAmount": 7.5,
        "currency": "inr",
        "items": [
            {"itemName": "Milk 1L", "quantity": 2, "price": 56.00},
            {"itemName": "Bread", "price": null}
        ]
    }"#;

    #[tokio::test]
    async fn well_formed_response_is_parsed() {
        let (parser, canned) = parser_replying(Ok(FULL));
        let r = parser.parse("Store ABC Total: 150.00 2024-12-16").await.unwrap();

        assert_eq!(r.merchant_name, "Store ABC");
        assert_eq!(r.total_amount, Decimal::new(15000, 2));
        assert_eq!(r.receipt_date, NaiveDate::from_ymd_opt(2024, 12, 16).unwrap());
        assert_eq!(r.tax_amount, Some(Decimal::new(75, 1)));
        assert_eq!(r.currency.as_deref(), Some("INR"));
        assert_eq!(r.items.len(), 2);
        assert_eq!(r.items[0].quantity, 2);
        assert_eq!(r.items[1].quantity, 1, "quantity defaults to 1");
        assert_eq!(r.items[1].price, None);

        let calls = canned.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, PARSING_TEMPERATURE);
        assert!(calls[0].0.ends_with("Store ABC Total: 150.00 2024-12-16"));
    }

    #[tokio::test]
    async fn fenced_response_matches_unfenced() {
        let (plain_parser, _) = parser_replying(Ok(FULL));
        let plain = plain_parser.parse("x").await.unwrap();
        for fenced in [
            format!("```json\n{FULL}\n```"),
            format!("```json {FULL} ```"),
        ] {
            let (fenced_parser, _) = parser_replying(Ok(&fenced));
            assert_eq!(plain, fenced_parser.parse("x").await.unwrap(), "{fenced}");
        }
    }

    #[tokio::test]
    async fn missing_required_fields_rejected() {
        for body in [
            r#"{"totalAmount": 1, "receiptDate": "2024-01-01"}"#,
            r#"{"merchantName": "  ", "totalAmount": 1, "receiptDate": "2024-01-01"}"#,
            r#"{"merchantName": "A", "receiptDate": "2024-01-01"}"#,
            r#"{"merchantName": "A", "totalAmount": null, "receiptDate": "2024-01-01"}"#,
            r#"{"merchantName": "A", "totalAmount": 1}"#,
        ] {
            let (parser, _) = parser_replying(Ok(body));
            let err = parser.parse("text").await.unwrap_err();
            assert!(matches!(err, ReceiptError::LlmFailure { .. }), "{body}: {err}");
        }
    }

    #[tokio::test]
    async fn not_a_receipt_is_an_llm_failure() {
        let (parser, _) = parser_replying(Ok(
            r#"{"merchantName": "NOT_A_RECEIPT", "totalAmount": null, "receiptDate": null, "items": []}"#,
        ));
        let err = parser.parse("load balancer diagram").await.unwrap_err();
        assert!(err.to_string().contains("not a receipt"), "{err}");
    }

    #[tokio::test]
    async fn malformed_json_is_an_llm_failure() {
        let (parser, _) = parser_replying(Ok("Sure! Here is the JSON you asked for"));
        assert!(matches!(
            parser.parse("text").await,
            Err(ReceiptError::LlmFailure { .. })
        ));
    }

    #[tokio::test]
    async fn negative_total_rejected() {
        let (parser, _) = parser_replying(Ok(
            r#"{"merchantName": "A", "totalAmount": -3, "receiptDate": "2024-01-01"}"#,
        ));
        assert!(parser.parse("text").await.is_err());
    }

    #[tokio::test]
    async fn bad_date_and_currency() {
        let (parser, _) = parser_replying(Ok(
            r#"{"merchantName": "A", "totalAmount": 3, "receiptDate": "16/12/2024"}"#,
        ));
        assert!(parser.parse("text").await.is_err());

        let (parser, _) = parser_replying(Ok(
            r#"{"merchantName": "A", "totalAmount": 3, "receiptDate": "2024-12-16", "currency": "₹"}"#,
        ));
        assert_eq!(parser.parse("text").await.unwrap().currency, None);
    }

    #[tokio::test]
    async fn blank_text_is_validation_and_skips_the_model() {
        let (parser, canned) = parser_replying(Ok(FULL));
        assert!(matches!(
            parser.parse("   ").await,
            Err(ReceiptError::Validation(_))
        ));
        assert!(canned.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn generator_error_propagates() {
        let (parser, _) = parser_replying(Err("request timed out"));
        let err = parser.parse("X").await.unwrap_err();
        assert!(matches!(err, ReceiptError::LlmFailure { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn blank_item_names_dropped() {
        let (parser, _) = parser_replying(Ok(
            r#"{"merchantName": "A", "totalAmount": 3, "receiptDate": "2024-12-16",
                "items": [{"itemName": ""}, {"itemName": null}, {"itemName": "Tea", "quantity": 0}]}"#,
        ));
        let r = parser.parse("text").await.unwrap();
        assert_eq!(r.items.len(), 1);
        assert_eq!(r.items[0].item_name, "Tea");
        assert_eq!(r.items[0].quantity, 1);
    }
}
