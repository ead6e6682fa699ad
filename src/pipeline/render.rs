//! PDF rasterisation: render every page of an in-memory PDF via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is CPU-bound. Rendering runs on the blocking pool so Tokio
//! worker threads never stall behind a 300 DPI page.
//!
//! ## Why a pixel cap on top of DPI?
//!
//! OCR wants a fixed physical resolution, so pages are scaled by
//! `dpi / 72`. A poster-sized page at 300 DPI would still be enormous, so
//! the longest edge is additionally capped at `max_rendered_pixels`.

use crate::config::PipelineConfig;
use crate::error::{PageError, ReceiptError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// One page of a rendered PDF. `image` is an error when only this page failed.
#[derive(Debug)]
pub struct RenderedPage {
    /// 1-indexed page number.
    pub page_num: usize,
    pub image: Result<DynamicImage, PageError>,
}

/// Rendering settings copied out of [`PipelineConfig`] so they can move into
/// a blocking task.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub dpi: u32,
    pub max_pixels: u32,
    pub pdfium_lib_path: Option<std::path::PathBuf>,
}

impl From<&PipelineConfig> for RenderOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            dpi: config.pdf_dpi,
            max_pixels: config.max_rendered_pixels,
            pdfium_lib_path: config.pdfium_lib_path.clone(),
        }
    }
}

/// Rasterise every page of `pdf_bytes`, in page order.
///
/// A document that cannot be opened is an [`ReceiptError::OcrFailure`]; a
/// single page that fails to render is returned as a [`PageError`] in its
/// slot and does not stop the remaining pages. Zero pages yields an empty
/// vector.
pub async fn render_pdf(
    pdf_bytes: Vec<u8>,
    options: RenderOptions,
) -> Result<Vec<RenderedPage>, ReceiptError> {
    tokio::task::spawn_blocking(move || render_pdf_blocking(&pdf_bytes, &options))
        .await
        .map_err(|e| ReceiptError::Internal(format!("Render task panicked: {}", e)))?
}

/// Load the pdfium library from `lib_dir`, or from the system search path.
pub fn bind_pdfium(lib_dir: Option<&Path>) -> Result<Pdfium, ReceiptError> {
    let bindings = match lib_dir {
        Some(dir) => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| {
        ReceiptError::ocr(format!(
            "Failed to bind to pdfium library: {:?}. Set the pdfium library path or install libpdfium.",
            e
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of page rendering.
fn render_pdf_blocking(
    pdf_bytes: &[u8],
    options: &RenderOptions,
) -> Result<Vec<RenderedPage>, ReceiptError> {
    let pdfium = bind_pdfium(options.pdfium_lib_path.as_deref())?;

    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| ReceiptError::ocr(format!("Failed to open PDF: {:?}", e)))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let max_pixels = options.max_pixels as i32;
    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(options.dpi as f32 / POINTS_PER_INCH)
        .set_maximum_width(max_pixels)
        .set_maximum_height(max_pixels);

    let mut results = Vec::with_capacity(total_pages);

    for idx in 0..total_pages {
        let page_num = idx + 1;
        let image = pages
            .get(idx as u16)
            .and_then(|page| {
                page.render_with_config(&render_config)
                    .map(|bitmap| bitmap.as_image())
            })
            .map_err(|e| PageError::RenderFailed {
                page: page_num,
                detail: format!("{:?}", e),
            });

        match &image {
            Ok(img) => debug!(
                "Rendered page {} → {}x{} px",
                page_num,
                img.width(),
                img.height()
            ),
            Err(e) => warn!("{}", e),
        }

        results.push(RenderedPage { page_num, image });
    }

    Ok(results)
}
