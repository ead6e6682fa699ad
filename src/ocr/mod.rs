//! OCR providers and the shared image/PDF extraction paths.
//!
//! An [`OcrProvider`] only has to know how to turn one raster image into
//! text. Everything around that is common and lives here:
//!
//! - decoding uploaded image bytes ([`decode_image`])
//! - rasterising a PDF, recognising each page, and tolerating per-page
//!   failures ([`extract_pdf_text`], [`recognise_pages`])
//! - joining page texts with numbered separators ([`assemble_pages`])
//!
//! | name        | engine                                 | available when                 |
//! |-------------|----------------------------------------|--------------------------------|
//! | `tesseract` | libtesseract via `leptess`             | built with `tesseract` and a blank image OCRs |
//! | `vision`    | a vision-capable `edgequake-llm` model | a provider could be built      |

pub mod tesseract;
pub mod vision;

pub use tesseract::TesseractOcr;
pub use vision::VisionOcr;

use crate::config::PipelineConfig;
use crate::error::{Capability, PageError, ReceiptError};
use crate::pipeline::render::{render_pdf, RenderOptions, RenderedPage};
use crate::registry::{Provider, ProviderRegistry};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// A backend that extracts text from receipt images and PDFs.
#[async_trait]
pub trait OcrProvider: Provider {
    /// Recognise a single encoded image (PNG, JPEG).
    ///
    /// Bytes that do not decode as an image are an
    /// [`ReceiptError::OcrFailure`]. A decodable image with no text yields an
    /// empty string.
    async fn extract_from_image(&self, bytes: &[u8]) -> Result<String, ReceiptError>;

    /// Recognise every page of a PDF, in page order.
    async fn extract_from_pdf(&self, bytes: &[u8]) -> Result<String, ReceiptError>;
}

/// Marker placed between the texts of consecutive non-empty pages.
pub fn page_separator(page_num: usize) -> String {
    format!("\n--- Page {} ---\n", page_num)
}

/// Decode `bytes` into an image.
///
/// # Errors
/// [`ReceiptError::Validation`] for an empty buffer,
/// [`ReceiptError::OcrFailure`] for undecodable data.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ReceiptError> {
    if bytes.is_empty() {
        return Err(ReceiptError::Validation("Image bytes cannot be empty".into()));
    }
    image::load_from_memory(bytes)
        .map_err(|e| ReceiptError::ocr_with("Failed to decode image", e))
}

/// Join `(page_num, text)` pairs, skipping pages with no text.
///
/// The first emitted page carries no separator; every later one is preceded
/// by [`page_separator`] with its own page number.
pub fn assemble_pages<I>(pages: I) -> String
where
    I: IntoIterator<Item = (usize, Option<String>)>,
{
    let mut out = String::new();
    let mut emitted = 0usize;
    for (page_num, text) in pages {
        let Some(text) = text else { continue };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if emitted > 0 {
            out.push_str(&page_separator(page_num));
        }
        out.push_str(text);
        emitted += 1;
    }
    out
}

/// Rasterise `pdf_bytes` and recognise each page with `recognise`.
///
/// Pages are recognised up to `concurrency` at a time, but results are
/// collected in page order (`buffered`, not `buffer_unordered`). A page that
/// fails to render or recognise is logged as a [`PageError`] and contributes
/// no text. A document with zero pages yields an empty string.
pub async fn extract_pdf_text<F, Fut>(
    pdf_bytes: &[u8],
    options: RenderOptions,
    concurrency: usize,
    recognise: F,
) -> Result<String, ReceiptError>
where
    F: Fn(DynamicImage) -> Fut,
    Fut: Future<Output = Result<String, ReceiptError>>,
{
    if pdf_bytes.is_empty() {
        return Err(ReceiptError::Validation("PDF bytes cannot be empty".into()));
    }

    let pages = render_pdf(pdf_bytes.to_vec(), options).await?;
    Ok(recognise_pages(pages, concurrency, recognise).await)
}

/// Recognise already rendered pages and join their texts.
///
/// Up to `concurrency` pages are in flight at once; output follows page order
/// regardless of completion order. Failed pages are logged and skipped.
pub async fn recognise_pages<F, Fut>(
    pages: Vec<RenderedPage>,
    concurrency: usize,
    recognise: F,
) -> String
where
    F: Fn(DynamicImage) -> Fut,
    Fut: Future<Output = Result<String, ReceiptError>>,
{
    let total = pages.len();
    let recognise = &recognise;

    let texts: Vec<(usize, Option<String>)> = stream::iter(pages)
        .map(|page| async move {
            let page_num = page.page_num;
            let result = match page.image {
                Ok(img) => recognise(img).await.map_err(|e| PageError::OcrFailed {
                    page: page_num,
                    detail: e.to_string(),
                }),
                Err(e) => Err(e),
            };
            match result {
                Ok(text) => (page_num, Some(text)),
                Err(e) => {
                    warn!("{}", e);
                    (page_num, None)
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let recognised = texts.iter().filter(|(_, t)| t.is_some()).count();
    info!("PDF OCR done: {}/{} pages recognised", recognised, total);

    assemble_pages(texts)
}

/// Build the OCR registry for `config`: Tesseract first, then vision.
pub fn default_ocr_providers(config: &PipelineConfig) -> ProviderRegistry<dyn OcrProvider> {
    let providers: Vec<Arc<dyn OcrProvider>> = vec![
        Arc::new(TesseractOcr::from_config(config)),
        Arc::new(VisionOcr::from_env(config)),
    ];
    ProviderRegistry::new(Capability::Ocr, providers, config.default_ocr_provider.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize, text: &str) -> (usize, Option<String>) {
        (n, Some(text.to_string()))
    }

    #[test]
    fn single_page_has_no_separator() {
        assert_eq!(assemble_pages(vec![page(1, "only page\n")]), "only page");
    }

    #[test]
    fn separators_number_pages_in_order() {
        let out = assemble_pages(vec![page(1, "one"), page(2, "two"), page(3, "three")]);
        assert_eq!(
            out,
            "one\n--- Page 2 ---\ntwo\n--- Page 3 ---\nthree"
        );
    }

    #[test]
    fn empty_and_failed_pages_are_skipped() {
        let pages = vec![
            page(1, "   "),
            (2, None),
            page(3, "three"),
            page(4, ""),
            page(5, "five"),
        ];
        let out = assemble_pages(pages);
        // The first emitted page (3) is not prefixed.
        assert_eq!(out, "three\n--- Page 5 ---\nfive");
    }

    #[test]
    fn separator_count_is_non_empty_pages_minus_one() {
        let cases: Vec<Vec<(usize, Option<String>)>> = vec![
            vec![],
            vec![(1, None)],
            vec![page(1, "a"), page(2, "b")],
            vec![page(1, "a"), (2, None), page(3, ""), page(4, "d"), page(5, "e")],
        ];
        for pages in cases {
            let non_empty = pages
                .iter()
                .filter(|(_, t)| t.as_deref().is_some_and(|t| !t.trim().is_empty()))
                .count();
            let out = assemble_pages(pages);
            let markers = out.matches("--- Page ").count();
            assert_eq!(markers, non_empty.saturating_sub(1), "output: {out:?}");
        }
    }

    /// A synthetic page whose image width encodes its page number.
    fn rendered(n: usize) -> RenderedPage {
        RenderedPage {
            page_num: n,
            image: Ok(DynamicImage::new_luma8(n as u32, 1)),
        }
    }

    #[tokio::test]
    async fn failed_pages_are_skipped_and_order_is_kept() {
        let pages = vec![
            rendered(1),
            rendered(2),
            RenderedPage {
                page_num: 3,
                image: Err(PageError::RenderFailed {
                    page: 3,
                    detail: "corrupt page".into(),
                }),
            },
            rendered(4),
            rendered(5),
        ];
        let calls = std::sync::atomic::AtomicUsize::new(0);

        let out = recognise_pages(pages, 3, |img| {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                let page = img.width() as u64;
                // Earlier pages finish last.
                tokio::time::sleep(std::time::Duration::from_millis(60 - page * 10)).await;
                match page {
                    2 => Err(ReceiptError::ocr("engine crashed")),
                    n => Ok(format!("text of page {n}\n")),
                }
            }
        })
        .await;

        assert_eq!(
            out,
            "text of page 1\n--- Page 4 ---\ntext of page 4\n--- Page 5 ---\ntext of page 5"
        );
        // The unrendered page never reaches the engine.
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn no_pages_yield_empty_text() {
        let out = recognise_pages(Vec::new(), 2, |_img| async { Ok("x".to_string()) }).await;
        assert_eq!(out, "");
    }

    #[tokio::test]
    async fn every_page_failing_yields_empty_text() {
        let out = recognise_pages(vec![rendered(1), rendered(2)], 1, |_img| async {
            Err(ReceiptError::ocr("no engine"))
        })
        .await;
        assert_eq!(out, "");
    }

    #[test]
    fn decode_rejects_garbage_and_empty() {
        assert!(matches!(
            decode_image(b"not an image"),
            Err(ReceiptError::OcrFailure { .. })
        ));
        assert!(matches!(decode_image(&[]), Err(ReceiptError::Validation(_))));
    }

    #[test]
    fn decode_accepts_png() {
        let img = DynamicImage::new_rgb8(4, 4);
        let png = crate::pipeline::encode::encode_png(&img).unwrap();
        assert_eq!(decode_image(&png).unwrap().width(), 4);
    }
}
