//! Image encoding for OCR engines and vision models.
//!
//! Rendered PDF pages leave pdfium as `DynamicImage`s, but both OCR back-ends
//! want encoded bytes: Tesseract reads PNG from memory, and vision models take
//! a base64 data payload. PNG is used throughout because it is lossless; JPEG
//! artefacts around thin receipt fonts cost more accuracy than the bytes saved.

use crate::error::ReceiptError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode an image as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ReceiptError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| ReceiptError::ocr_with("Failed to encode image as PNG", e))?;
    debug!(
        "Encoded {}x{} image → {} PNG bytes",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Wrap already-encoded image bytes for a vision-model request.
///
/// `detail: "high"` asks GPT-4-class models for the full tile budget; at the
/// default single-tile overview, line-item prices on a long receipt blur out.
pub fn to_image_data(bytes: &[u8], mime_type: &str) -> ImageData {
    ImageData::new(STANDARD.encode(bytes), mime_type).with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255])));
        let png = encode_png(&img).expect("encode should succeed");
        assert!(png.starts_with(b"\x89PNG"));
        // Re-decodes to the same dimensions.
        let back = image::load_from_memory(&png).unwrap();
        assert_eq!((back.width(), back.height()), (10, 10));
    }

    #[test]
    fn image_data_is_base64_of_input() {
        let data = to_image_data(b"abc", "image/png");
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&data.data).unwrap(), b"abc");
    }
}
