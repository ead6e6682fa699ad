//! Upload validation and content-type sniffing.
//!
//! Uploads are checked before anything is stored: an empty or oversized file,
//! or a type the OCR stage cannot read, is a [`ReceiptError::Validation`]
//! returned straight to the uploader. PDF detection uses the `%PDF` magic
//! bytes; images go through [`image::guess_format`].

use crate::error::ReceiptError;
use tracing::debug;

pub const CONTENT_TYPE_PDF: &str = "application/pdf";
pub const CONTENT_TYPE_JPEG: &str = "image/jpeg";
pub const CONTENT_TYPE_PNG: &str = "image/png";

/// Content types accepted for upload.
pub const ALLOWED_CONTENT_TYPES: [&str; 4] =
    [CONTENT_TYPE_JPEG, "image/jpg", CONTENT_TYPE_PNG, CONTENT_TYPE_PDF];

/// Check that an upload is non-empty, within `max_bytes`, and of an allowed type.
pub fn validate_upload(
    bytes: &[u8],
    content_type: &str,
    max_bytes: usize,
) -> Result<(), ReceiptError> {
    if bytes.is_empty() {
        return Err(ReceiptError::Validation("File cannot be empty".into()));
    }

    if bytes.len() > max_bytes {
        return Err(ReceiptError::Validation(format!(
            "File size ({} bytes) exceeds maximum allowed size of {} bytes",
            bytes.len(),
            max_bytes
        )));
    }

    let normalized = content_type.trim().to_ascii_lowercase();
    if !ALLOWED_CONTENT_TYPES.contains(&normalized.as_str()) {
        return Err(ReceiptError::Validation(format!(
            "Invalid file type: '{}'. Allowed types: {}",
            content_type,
            ALLOWED_CONTENT_TYPES.join(", ")
        )));
    }

    debug!("Upload accepted: {} bytes, {}", bytes.len(), normalized);
    Ok(())
}

/// Guess the content type of `bytes`. Returns None for unsupported data.
pub fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF") {
        return Some(CONTENT_TYPE_PDF);
    }
    match image::guess_format(bytes).ok()? {
        image::ImageFormat::Png => Some(CONTENT_TYPE_PNG),
        image::ImageFormat::Jpeg => Some(CONTENT_TYPE_JPEG),
        _ => None,
    }
}

/// File extension (with dot) for a stored upload of `content_type`.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type.trim().to_ascii_lowercase().as_str() {
        CONTENT_TYPE_PDF => ".pdf",
        CONTENT_TYPE_PNG => ".png",
        CONTENT_TYPE_JPEG | "image/jpg" => ".jpg",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn empty_upload_rejected() {
        assert!(matches!(
            validate_upload(&[], CONTENT_TYPE_PNG, 10),
            Err(ReceiptError::Validation(_))
        ));
    }

    #[test]
    fn oversized_upload_rejected() {
        let err = validate_upload(&[0u8; 11], CONTENT_TYPE_PNG, 10).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn content_type_checked_case_insensitively() {
        assert!(validate_upload(b"%PDF-1.7", "Application/PDF", 100).is_ok());
        assert!(validate_upload(b"x", "image/jpg", 100).is_ok());
        assert!(validate_upload(b"x", "text/plain", 100).is_err());
    }

    #[test]
    fn sniffs_pdf_and_png() {
        assert_eq!(sniff_content_type(b"%PDF-1.4\n..."), Some(CONTENT_TYPE_PDF));
        assert_eq!(sniff_content_type(PNG_MAGIC), Some(CONTENT_TYPE_PNG));
        assert_eq!(sniff_content_type(b"\xFF\xD8\xFF\xE0"), Some(CONTENT_TYPE_JPEG));
        assert_eq!(sniff_content_type(b"hello world"), None);
    }

    #[test]
    fn extensions() {
        assert_eq!(extension_for("application/pdf"), ".pdf");
        assert_eq!(extension_for("image/jpg"), ".jpg");
        assert_eq!(extension_for("weird/type"), "");
    }
}
