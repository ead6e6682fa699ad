//! Named provider lookup with availability fallback.
//!
//! One [`ProviderRegistry`] is built at startup for each provider family
//! (OCR, text generation) and then shared read-only through an `Arc`.
//!
//! ## Resolution order
//!
//! 1. An empty request means the configured default name.
//! 2. A provider whose name matches case-insensitively and reports itself
//!    available is returned.
//! 3. Otherwise the first available provider in registration order is
//!    returned, with a warning.
//! 4. If none is available the call fails with
//!    [`ReceiptError::ProviderUnavailable`].

use crate::error::{Capability, ReceiptError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What every provider, of any family, exposes to the registry.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable, human-readable name used for lookup (compared case-insensitively).
    fn provider_name(&self) -> &str;

    /// Cheap self-test. Must never panic; any internal error means `false`.
    async fn is_available(&self) -> bool;
}

/// An immutable, ordered set of providers of one family.
pub struct ProviderRegistry<P: ?Sized + Provider> {
    capability: Capability,
    providers: Vec<Arc<P>>,
    default_name: String,
}

impl<P: ?Sized + Provider> ProviderRegistry<P> {
    /// Build a registry. Later providers whose name collides
    /// (case-insensitively) with an earlier one are dropped with a warning.
    pub fn new(
        capability: Capability,
        providers: Vec<Arc<P>>,
        default_name: impl Into<String>,
    ) -> Self {
        let mut unique: Vec<Arc<P>> = Vec::with_capacity(providers.len());
        for provider in providers {
            let name = provider.provider_name();
            if unique
                .iter()
                .any(|p| p.provider_name().eq_ignore_ascii_case(name))
            {
                warn!(
                    "Duplicate {} provider name '{}'; keeping the first registered",
                    capability, name
                );
                continue;
            }
            unique.push(provider);
        }

        let registry = Self {
            capability,
            providers: unique,
            default_name: default_name.into(),
        };
        info!(
            "Initialised {} registry with providers [{}] (default: {})",
            capability,
            registry.names().join(", "),
            registry.default_name
        );
        registry
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.provider_name()).collect()
    }

    /// Resolve the configured default provider.
    pub async fn resolve_default(&self) -> Result<Arc<P>, ReceiptError> {
        self.resolve(&self.default_name).await
    }

    /// Resolve `requested`, falling back to the first available provider.
    pub async fn resolve(&self, requested: &str) -> Result<Arc<P>, ReceiptError> {
        let requested = requested.trim();
        let name = if requested.is_empty() {
            self.default_name.as_str()
        } else {
            requested
        };

        if let Some(provider) = self
            .providers
            .iter()
            .find(|p| p.provider_name().eq_ignore_ascii_case(name))
        {
            if provider.is_available().await {
                debug!("Resolved {} provider '{}'", self.capability, name);
                return Ok(Arc::clone(provider));
            }
        }

        warn!(
            "{} provider '{}' not found or not available; falling back to the first available",
            self.capability, name
        );
        self.first_available().await
    }

    /// First provider in registration order that reports itself available.
    pub async fn first_available(&self) -> Result<Arc<P>, ReceiptError> {
        for provider in &self.providers {
            if provider.is_available().await {
                info!(
                    "Using {} provider '{}'",
                    self.capability,
                    provider.provider_name()
                );
                return Ok(Arc::clone(provider));
            }
        }
        Err(ReceiptError::ProviderUnavailable {
            capability: self.capability,
            registered: self.names().join(", "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fake {
        name: &'static str,
        available: bool,
        checks: AtomicUsize,
    }

    impl Fake {
        fn new(name: &'static str, available: bool) -> Arc<dyn Provider> {
            Arc::new(Self {
                name,
                available,
                checks: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Provider for Fake {
        fn provider_name(&self) -> &str {
            self.name
        }

        async fn is_available(&self) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.available
        }
    }

    fn registry(providers: Vec<Arc<dyn Provider>>, default: &str) -> ProviderRegistry<dyn Provider> {
        ProviderRegistry::new(Capability::Ocr, providers, default)
    }

    #[tokio::test]
    async fn resolves_requested_name_case_insensitively() {
        let reg = registry(vec![Fake::new("Tesseract", true), Fake::new("vision", true)], "tesseract");
        let p = reg.resolve("VISION").await.unwrap();
        assert_eq!(p.provider_name(), "vision");
    }

    #[tokio::test]
    async fn empty_name_means_default() {
        let reg = registry(vec![Fake::new("a", true), Fake::new("b", true)], "b");
        assert_eq!(reg.resolve("").await.unwrap().provider_name(), "b");
        assert_eq!(reg.resolve("   ").await.unwrap().provider_name(), "b");
        assert_eq!(reg.resolve_default().await.unwrap().provider_name(), "b");
    }

    #[tokio::test]
    async fn unknown_name_falls_back_to_first_available() {
        let reg = registry(vec![Fake::new("a", false), Fake::new("b", true), Fake::new("c", true)], "a");
        assert_eq!(reg.resolve("nope").await.unwrap().provider_name(), "b");
    }

    #[tokio::test]
    async fn unavailable_name_falls_back() {
        let reg = registry(vec![Fake::new("a", true), Fake::new("b", false)], "b");
        assert_eq!(reg.resolve("b").await.unwrap().provider_name(), "a");
    }

    #[tokio::test]
    async fn nothing_available_is_an_error() {
        let reg = registry(vec![Fake::new("a", false)], "a");
        let err = match reg.resolve("a").await {
            Ok(_) => panic!("expected ProviderUnavailable"),
            Err(e) => e,
        };
        assert!(matches!(
            err,
            ReceiptError::ProviderUnavailable {
                capability: Capability::Ocr,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn duplicates_keep_first_registered() {
        let reg = registry(vec![Fake::new("dup", false), Fake::new("DUP", true)], "dup");
        assert_eq!(reg.names(), vec!["dup"]);
        // The surviving "dup" is unavailable and there is nothing to fall back to.
        assert!(reg.resolve("dup").await.is_err());
    }
}
