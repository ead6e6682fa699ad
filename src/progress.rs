//! Observer trait for receipt-processing events.
//!
//! Inject an [`Arc<dyn PipelineObserver>`] via
//! [`crate::service::ReceiptService::with_observer`] to receive events as a
//! receipt moves through the pipeline.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a spinner, a broadcast channel, or a metrics sink
//! without the library knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use edgequake_receipt::{PipelineObserver, Stage};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use uuid::Uuid;
//!
//! struct CountingObserver {
//!     failures: AtomicUsize,
//! }
//!
//! impl PipelineObserver for CountingObserver {
//!     fn on_failed(&self, _id: Uuid, reason: &str) {
//!         self.failures.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("receipt failed: {reason}");
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A long-running pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ocr,
    Parsing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Ocr => f.write_str("OCR"),
            Stage::Parsing => f.write_str("parsing"),
        }
    }
}

/// Called by [`crate::service::ReceiptService`] while a receipt is processed.
///
/// Implementations must be `Send + Sync`: different receipts may be
/// processed concurrently. All methods default to no-ops so callers only
/// override what they care about.
pub trait PipelineObserver: Send + Sync {
    /// A stage is about to call its provider.
    fn on_stage_start(&self, id: Uuid, stage: Stage) {
        let _ = (id, stage);
    }

    /// A stage succeeded. `output_len` is the OCR text length in bytes for
    /// [`Stage::Ocr`] and the number of extracted items for [`Stage::Parsing`].
    fn on_stage_complete(&self, id: Uuid, stage: Stage, output_len: usize) {
        let _ = (id, stage, output_len);
    }

    /// The receipt reached `COMPLETED`.
    fn on_completed(&self, id: Uuid) {
        let _ = id;
    }

    /// The receipt reached `FAILED` with `reason`.
    fn on_failed(&self, id: Uuid, reason: &str) {
        let _ = (id, reason);
    }
}

/// The default observer: ignores every event.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Convenience alias for the type held by the service.
pub type Observer = Arc<dyn PipelineObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Tracking {
        events: Mutex<Vec<String>>,
    }

    impl PipelineObserver for Tracking {
        fn on_stage_start(&self, _id: Uuid, stage: Stage) {
            self.events.lock().unwrap().push(format!("start {stage}"));
        }
        fn on_failed(&self, _id: Uuid, reason: &str) {
            self.events.lock().unwrap().push(format!("failed {reason}"));
        }
    }

    #[test]
    fn noop_accepts_everything() {
        let o = NoopObserver;
        o.on_stage_start(Uuid::nil(), Stage::Ocr);
        o.on_stage_complete(Uuid::nil(), Stage::Parsing, 3);
        o.on_completed(Uuid::nil());
        o.on_failed(Uuid::nil(), "x");
    }

    #[test]
    fn overridden_methods_are_called_through_arc() {
        let tracking = Arc::new(Tracking::default());
        let observer: Observer = tracking.clone();
        observer.on_stage_start(Uuid::nil(), Stage::Ocr);
        observer.on_completed(Uuid::nil());
        observer.on_failed(Uuid::nil(), "boom");
        assert_eq!(
            *tracking.events.lock().unwrap(),
            vec!["start OCR".to_string(), "failed boom".to_string()]
        );
    }
}
