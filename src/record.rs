//! Receipt records and the transient parsing result.
//!
//! [`ReceiptRecord`] is the persisted unit of work. It is created `Pending`
//! at upload time and mutated in place by each pipeline stage. Its
//! [`LineItem`]s have no identity of their own; a successful parse replaces
//! the whole list.
//!
//! [`ParsingResult`] is what the language model answered, already validated.
//! It is never stored on its own.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Currency assumed until a parse says otherwise.
pub const DEFAULT_CURRENCY: &str = "INR";

/// Merchant name used before extraction has run.
pub const PLACEHOLDER_MERCHANT: &str = "Unknown";

/// Processing state of a receipt.
///
/// ```text
/// Pending ──▶ Processing ──▶ Completed
///    │            │
///    └────────────┴────────▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    /// Stored, nothing extracted yet.
    Pending,
    /// OCR text stored; parsing not attempted yet or in flight.
    Processing,
    /// Parse succeeded and was applied.
    Completed,
    /// A stage failed; `failure_reason` says which.
    Failed,
}

impl ProcessingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessingStatus::Pending => "PENDING",
            ProcessingStatus::Processing => "PROCESSING",
            ProcessingStatus::Completed => "COMPLETED",
            ProcessingStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Where the uploaded file lives and what it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_name: String,
    pub content_type: String,
    /// Opaque token returned by [`crate::store::FileStore::store`].
    pub storage_path: String,
    pub uploaded_at: DateTime<Utc>,
}

impl FileMetadata {
    pub fn is_pdf(&self) -> bool {
        self.content_type.eq_ignore_ascii_case("application/pdf")
    }
}

/// One purchased line on a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_name: String,
    /// Always ≥ 1.
    pub quantity: u32,
    /// Unit price, when the receipt shows one.
    pub unit_price: Option<Decimal>,
}

/// A receipt and everything extracted from it so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    pub id: Uuid,
    pub owner: String,
    pub merchant_name: String,
    pub total_amount: Decimal,
    pub receipt_date: NaiveDate,
    pub tax_amount: Option<Decimal>,
    pub currency: String,
    pub raw_ocr_text: Option<String>,
    pub items: Vec<LineItem>,
    pub file: Option<FileMetadata>,
    status: ProcessingStatus,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl ReceiptRecord {
    /// A freshly uploaded receipt: `Pending`, placeholder values, no text.
    pub fn new_pending(owner: impl Into<String>, file: Option<FileMetadata>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            merchant_name: PLACEHOLDER_MERCHANT.to_string(),
            total_amount: Decimal::ZERO,
            receipt_date: now.date_naive(),
            tax_amount: None,
            currency: DEFAULT_CURRENCY.to_string(),
            raw_ocr_text: None,
            items: Vec::new(),
            file,
            status: ProcessingStatus::Pending,
            failure_reason: None,
            created_at: now,
        }
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    /// Set only while `status == Failed`.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The stored file reference, if both metadata and a path are present.
    pub fn storage_path(&self) -> Option<&str> {
        self.file
            .as_ref()
            .map(|f| f.storage_path.as_str())
            .filter(|p| !p.trim().is_empty())
    }

    /// OCR finished: keep the text and move to `Processing`.
    pub fn mark_ocr_done(&mut self, text: String) {
        self.raw_ocr_text = Some(text);
        self.status = ProcessingStatus::Processing;
        self.failure_reason = None;
    }

    pub fn mark_completed(&mut self) {
        self.status = ProcessingStatus::Completed;
        self.failure_reason = None;
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = ProcessingStatus::Failed;
        self.failure_reason = Some(reason.into());
    }

    /// Overwrite extracted fields with a parse result.
    ///
    /// Currency is only replaced when the result supplies a valid code.
    /// The item list is cleared and rebuilt, never merged.
    pub fn apply_result(&mut self, result: &ParsingResult) {
        self.merchant_name = result.merchant_name.clone();
        self.total_amount = to_money(result.total_amount);
        self.receipt_date = result.receipt_date;
        self.tax_amount = result.tax_amount.map(to_money);
        if let Some(ref currency) = result.currency {
            self.currency = currency.clone();
        }

        self.items.clear();
        self.items.extend(result.items.iter().map(|item| LineItem {
            item_name: item.item_name.clone(),
            quantity: item.quantity,
            unit_price: item.price,
        }));
    }
}

/// Round half away from zero and fix the scale at two places, so `150`
/// is stored and serialised as `150.00`.
fn to_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// The model's structured answer, validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsingResult {
    pub merchant_name: String,
    pub total_amount: Decimal,
    pub receipt_date: NaiveDate,
    pub tax_amount: Option<Decimal>,
    /// Upper-case ISO 4217 code, when the model gave a valid one.
    pub currency: Option<String>,
    pub items: Vec<ParsedItem>,
}

/// One item of a [`ParsingResult`], defaults already applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedItem {
    pub item_name: String,
    pub quantity: u32,
    pub price: Option<Decimal>,
}
