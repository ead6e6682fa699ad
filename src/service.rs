//! Receipt service: upload, the processing state machine, and queries.
//!
//! ## State machine
//!
//! ```text
//!            no file ────────────────────────────────┐
//!               │                                     ▼
//! PENDING ──▶ OCR ──ok──▶ PROCESSING ──▶ parse ──ok──▶ COMPLETED
//!               │                          │
//!               └──err──▶ FAILED ◀───err───┘
//! ```
//!
//! Every stage failure becomes a persisted `FAILED` record with a reason
//! naming the stage. [`ReceiptService::process`] therefore only returns an
//! error when the receipt does not exist or the repository itself fails.
//!
//! ## Freshness
//!
//! The record is re-read from the repository immediately before each stage's
//! final write, so changes made by someone else while a provider call was in
//! flight are not overwritten with a stale copy. This narrows lost updates
//! but does not serialise concurrent runs on the same receipt.

use crate::config::PipelineConfig;
use crate::error::ReceiptError;
use crate::llm::default_generators;
use crate::ocr::{default_ocr_providers, OcrProvider};
use crate::pipeline::input::{extension_for, sniff_content_type, validate_upload, CONTENT_TYPE_PDF};
use crate::pipeline::normalize::normalize_currency;
use crate::pipeline::parse::ReceiptParser;
use crate::progress::{NoopObserver, Observer, Stage};
use crate::record::{FileMetadata, ReceiptRecord};
use crate::registry::ProviderRegistry;
use crate::repository::{JsonDirRepository, ReceiptRepository};
use crate::store::{FileStore, LocalFileStore};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Failure reason for a receipt with nothing to extract from.
pub const MISSING_FILE_REASON: &str = "missing file metadata or storage path";

/// Default largest accepted upload: 10 MiB.
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub struct ReceiptService {
    store: Arc<dyn FileStore>,
    repository: Arc<dyn ReceiptRepository>,
    ocr: Arc<ProviderRegistry<dyn OcrProvider>>,
    parser: ReceiptParser,
    observer: Observer,
    max_upload_bytes: usize,
}

impl ReceiptService {
    pub fn new(
        store: Arc<dyn FileStore>,
        repository: Arc<dyn ReceiptRepository>,
        ocr: Arc<ProviderRegistry<dyn OcrProvider>>,
        parser: ReceiptParser,
    ) -> Self {
        Self {
            store,
            repository,
            ocr,
            parser,
            observer: Arc::new(NoopObserver),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Wire up the default providers, a [`LocalFileStore`] under
    /// `config.storage_dir`, and a [`JsonDirRepository`] in its `records/`
    /// sub-directory.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let ocr = Arc::new(default_ocr_providers(config));
        let parser = ReceiptParser::new(Arc::new(default_generators(config)));
        Self::new(
            Arc::new(LocalFileStore::new(&config.storage_dir)),
            Arc::new(JsonDirRepository::new(config.storage_dir.join("records"))),
            ocr,
            parser,
        )
        .with_max_upload_bytes(config.max_upload_bytes)
    }

    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_max_upload_bytes(mut self, max: usize) -> Self {
        self.max_upload_bytes = max;
        self
    }

    // ── Upload ───────────────────────────────────────────────────────────

    /// Validate and store an upload, create a `PENDING` record, then try to
    /// process it straight away.
    ///
    /// `content_type` is sniffed from the bytes when not given. A failed
    /// processing attempt does not fail the upload: the returned record is
    /// whatever state the pipeline reached, typically `FAILED`.
    pub async fn upload(
        &self,
        owner: &str,
        bytes: &[u8],
        file_name: &str,
        content_type: Option<&str>,
    ) -> Result<ReceiptRecord, ReceiptError> {
        if owner.trim().is_empty() {
            return Err(ReceiptError::Validation("Owner cannot be empty".into()));
        }
        info!("Uploading receipt for {}", owner);

        let content_type = match content_type {
            Some(ct) => ct.trim().to_ascii_lowercase(),
            None => sniff_content_type(bytes)
                .ok_or_else(|| {
                    ReceiptError::Validation("Cannot determine the file type of the upload".into())
                })?
                .to_string(),
        };
        validate_upload(bytes, &content_type, self.max_upload_bytes)?;

        let stored_name = if Path::new(file_name).extension().is_some() {
            file_name.to_string()
        } else {
            format!("{}{}", file_name, extension_for(&content_type))
        };
        let token = self.store.store(bytes, owner, &stored_name).await?;

        let record = ReceiptRecord::new_pending(
            owner,
            Some(FileMetadata {
                file_name: file_name.to_string(),
                content_type,
                storage_path: token.clone(),
                uploaded_at: Utc::now(),
            }),
        );
        let saved = match self.repository.save(record).await {
            Ok(saved) => saved,
            Err(e) => {
                if let Err(cleanup) = self.store.delete(&token).await {
                    warn!("Could not remove orphaned upload {}: {}", token, cleanup);
                }
                return Err(e);
            }
        };
        let id = saved.id;
        info!("Receipt created with ID: {}", id);

        match self.process(id).await {
            Ok(processed) => Ok(processed),
            Err(e) => {
                warn!(
                    "Auto-processing failed for receipt {}: {}. Receipt saved but not processed.",
                    id, e
                );
                Ok(self
                    .repository
                    .find_by_id(id)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or(saved))
            }
        }
    }

    // ── Processing ───────────────────────────────────────────────────────

    /// Run (or re-run) the full pipeline for receipt `id`.
    ///
    /// # Errors
    /// [`ReceiptError::NotFound`] if there is no such receipt, or a
    /// repository error if a terminal state could not be persisted.
    pub async fn process(&self, id: Uuid) -> Result<ReceiptRecord, ReceiptError> {
        info!("Processing receipt with ID: {}", id);
        let record = self.get(id).await?;

        match self.run_pipeline(record).await {
            Ok(record) => Ok(record),
            Err(e @ ReceiptError::NotFound { .. }) => Err(e),
            Err(e) => {
                error!("Unexpected error processing receipt {}: {}", id, e);
                let latest = self.get(id).await?;
                self.fail(latest, format!("Processing error: {}", e)).await
            }
        }
    }

    async fn run_pipeline(&self, record: ReceiptRecord) -> Result<ReceiptRecord, ReceiptError> {
        let id = record.id;
        let Some(file) = record.storage_path().and(record.file.clone()) else {
            error!("Receipt {} has no file metadata or storage path", id);
            return self.fail(record, MISSING_FILE_REASON).await;
        };

        // OCR stage
        self.observer.on_stage_start(id, Stage::Ocr);
        let ocr_result = self.extract_stored(&file).await;
        let mut latest = self.get(id).await?;
        let text = match ocr_result {
            Ok(text) => text,
            Err(e) => return self.fail(latest, failure_reason(Stage::Ocr, &e)).await,
        };
        info!("OCR completed for receipt {}. Extracted {} characters.", id, text.chars().count());
        self.observer.on_stage_complete(id, Stage::Ocr, text.len());
        latest.mark_ocr_done(text.clone());
        self.repository.save(latest).await?;

        // Parsing stage
        self.observer.on_stage_start(id, Stage::Parsing);
        let parsed = self.parser.parse(&normalize_currency(&text)).await;
        let mut latest = self.get(id).await?;
        match parsed {
            Ok(result) => {
                info!(
                    "Parsing completed for receipt {}. Merchant: {}, total: {}",
                    id, result.merchant_name, result.total_amount
                );
                self.observer
                    .on_stage_complete(id, Stage::Parsing, result.items.len());
                ReceiptParser::apply_result(&mut latest, &result);
                latest.mark_completed();
                let saved = self.repository.save(latest).await?;
                self.observer.on_completed(id);
                Ok(saved)
            }
            Err(e) => self.fail(latest, failure_reason(Stage::Parsing, &e)).await,
        }
    }

    async fn fail(
        &self,
        mut record: ReceiptRecord,
        reason: impl Into<String>,
    ) -> Result<ReceiptRecord, ReceiptError> {
        let reason = reason.into();
        error!("Receipt {} failed: {}", record.id, reason);
        record.mark_failed(reason.clone());
        let saved = self.repository.save(record).await?;
        self.observer.on_failed(saved.id, &reason);
        Ok(saved)
    }

    async fn extract_stored(&self, file: &FileMetadata) -> Result<String, ReceiptError> {
        let provider = self.ocr.resolve_default().await?;
        let bytes = self.store.load(&file.storage_path).await?;
        dispatch(provider.as_ref(), &bytes, file.is_pdf()).await
    }

    /// OCR `bytes` with the default provider and normalise currency symbols.
    /// Nothing is stored.
    pub async fn extract_text(&self, bytes: &[u8], content_type: &str) -> Result<String, ReceiptError> {
        let provider = self.ocr.resolve_default().await?;
        let is_pdf = content_type.trim().eq_ignore_ascii_case(CONTENT_TYPE_PDF);
        let text = dispatch(provider.as_ref(), bytes, is_pdf).await?;
        Ok(normalize_currency(&text))
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub async fn get(&self, id: Uuid) -> Result<ReceiptRecord, ReceiptError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(ReceiptError::NotFound { id })
    }

    /// Receipts of `owner`, newest first.
    pub async fn list_for_owner(&self, owner: &str) -> Result<Vec<ReceiptRecord>, ReceiptError> {
        self.repository.find_by_owner(owner).await
    }
}

async fn dispatch(provider: &dyn OcrProvider, bytes: &[u8], is_pdf: bool) -> Result<String, ReceiptError> {
    info!(
        "Extracting text with '{}' ({})",
        provider.provider_name(),
        if is_pdf { "pdf" } else { "image" }
    );
    if is_pdf {
        provider.extract_from_pdf(bytes).await
    } else {
        provider.extract_from_image(bytes).await
    }
}

/// Reason string persisted on a `FAILED` record.
fn failure_reason(stage: Stage, err: &ReceiptError) -> String {
    match (stage, err) {
        (Stage::Ocr, ReceiptError::OcrFailure { .. } | ReceiptError::ProviderUnavailable { .. }) => {
            format!("OCR processing failed: {}", err)
        }
        (
            Stage::Parsing,
            ReceiptError::LlmFailure { .. } | ReceiptError::ProviderUnavailable { .. },
        ) => format!("LLM parsing failed: {}", err),
        _ => format!("Processing error: {}", err),
    }
}
