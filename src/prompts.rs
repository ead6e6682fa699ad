//! Prompts sent to language models.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — the response contract the structured parser
//!    depends on is written down exactly once.
//!
//! 2. **Testability** — unit tests can inspect the rendered prompt without
//!    spinning up a model, so contract regressions are caught early.
//!
//! Neither prompt is configurable at runtime.

use crate::error::ReceiptError;

/// Sentinel the model returns as `merchantName` for documents that are not receipts.
pub const NOT_A_RECEIPT: &str = "NOT_A_RECEIPT";

/// Last-resort merchant name when none can be read.
pub const UNKNOWN_MERCHANT: &str = "UNKNOWN_MERCHANT";

const OCR_TEXT_PLACEHOLDER: &str = "{ocr_text}";

/// Receipt extraction prompt. `{ocr_text}` is replaced with the OCR output.
pub const RECEIPT_PARSING_PROMPT: &str = r#"You are a deterministic financial receipt data extraction system.

Your task is to extract structured receipt information from OCR text.
You must behave like a backend service, not a conversational assistant.

OUTPUT CONTRACT (STRICT)
- Return ONLY valid JSON
- Do NOT include markdown, code fences, explanations, comments, or extra text
- The response MUST be directly JSON-parseable

OUTPUT SCHEMA
{
  "merchantName": string,          // required
  "totalAmount": number,           // required, numeric only
  "receiptDate": string,           // required, YYYY-MM-DD
  "taxAmount": number | null,      // optional
  "currency": string,              // 3-letter ISO code, default "INR"
  "items": [
    {
      "itemName": string,          // required
      "quantity": number,          // default 1
      "price": number | null       // unit price
    }
  ]
}

NON-RECEIPT DETECTION (MANDATORY)
If the OCR text does NOT represent a receipt (diagrams, articles, forms,
system designs, or other unrelated documents):
- Set "merchantName" to "NOT_A_RECEIPT"
- Set every other field to null or an empty array
- Do not guess

EXTRACTION RULES (HARD CONSTRAINTS)
1. Merchant name
   - Use the store or business name clearly printed on the receipt
   - If none is printed, use the most prominent header text
   - Use "UNKNOWN_MERCHANT" only as a last resort
   - Never invent a merchant name

2. Total amount
   - Use the FINAL amount paid by the customer
   - Prefer labels such as TOTAL, GRAND TOTAL, AMOUNT PAID, NET PAYABLE
   - Ignore subtotals, discounts and intermediate totals
   - Output a number only (no currency symbols, no thousands separators)

3. Date
   - Output YYYY-MM-DD
   - If several dates appear, use the transaction date
   - If the year is missing, use the most recent plausible year
   - Dates must not be in the future (allow one day for time zones)

4. Tax
   - Extract only when explicitly shown (GST, CGST, SGST, IGST, VAT, TAX)
   - Otherwise null

5. Currency
   - ₹ → INR, $ → USD, € → EUR, £ → GBP
   - ¥ → JPY, EXCEPT when GST/CGST/SGST or other Indian context is present:
     then it is a misread ₹ and the currency is INR
   - If GST/CGST/SGST labels are present, the currency is INR
   - If the currency is ambiguous, use INR

ITEM RULES
- Extract each distinct purchased item when item lines are present
- itemName must be the product description actually printed on the receipt
- Fix obvious OCR noise (spacing, casing) but keep brand, size and variant
- Merge repeated items with the same name and sum their quantities
- Never use placeholders such as "Item 1", "Product" or "Unknown"
- Drop items whose names cannot be read; if none can be read, return []

SAFETY RULES
- Prefer accuracy over completeness
- Never fabricate merchants, items, or amounts
- When a value cannot be determined safely use null, [] or "UNKNOWN_MERCHANT"

OCR INPUT
{ocr_text}"#;

/// System prompt for transcribing a receipt image with a vision model.
pub const VISION_OCR_PROMPT: &str = r#"You are an OCR engine. Transcribe ALL text visible in the image exactly as printed.

Rules:
- Preserve line breaks and the reading order of the receipt
- Keep numbers, decimal points and currency symbols exactly as shown
- Do NOT summarise, translate, correct, or explain
- Do NOT wrap the output in code fences
- If the image contains no text, output nothing"#;

/// Render the receipt extraction prompt around `ocr_text`.
///
/// # Errors
/// [`ReceiptError::Validation`] when `ocr_text` is empty or whitespace-only.
pub fn build_receipt_prompt(ocr_text: &str) -> Result<String, ReceiptError> {
    if ocr_text.trim().is_empty() {
        return Err(ReceiptError::Validation(
            "OCR text cannot be empty".to_string(),
        ));
    }
    Ok(RECEIPT_PARSING_PROMPT.replacen(OCR_TEXT_PLACEHOLDER, ocr_text, 1))
}
