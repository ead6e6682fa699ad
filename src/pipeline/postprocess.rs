//! Post-processing: deterministic cleanup of raw model output before JSON
//! deserialisation.
//!
//! ## Why is post-processing necessary?
//!
//! The parsing prompt says "return ONLY valid JSON", and models mostly
//! comply. The failures that remain are cosmetic rather than semantic:
//!
//! - Wrapping the object in ` ```json ... ``` ` fences anyway
//! - Only an opening fence when the response is cut short
//! - Windows-style `\r\n` line endings
//! - A leading BOM or zero-width space from the provider's tokenizer
//!
//! Each of these would make `serde_json` reject an otherwise perfect answer,
//! so they are fixed here instead of being surfaced as parse failures.
//!
//! ## Rule Order
//!
//! Invisible characters go first so a BOM cannot hide the opening fence;
//! fences are stripped before the final trim.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw model response.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip one leading code fence, with or without a `json` tag
/// 4. Strip one trailing code fence
/// 5. Trim surrounding whitespace
pub fn clean_model_output(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = normalise_line_endings(&s);
    let s = strip_leading_fence(s.trim());
    let s = strip_trailing_fence(s);
    s.trim().to_string()
}

// ── Rule 1: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rules 3–4: Code fences ───────────────────────────────────────────────────

static RE_LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```[ \t]*(?:json)?\s*").unwrap());

static RE_TRAILING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n?```\s*$").unwrap());

fn strip_leading_fence(input: &str) -> &str {
    match RE_LEADING_FENCE.find(input) {
        Some(m) => &input[m.end()..],
        None => input,
    }
}

fn strip_trailing_fence(input: &str) -> &str {
    match RE_TRAILING_FENCE.find(input) {
        Some(m) => &input[..m.start()],
        None => input,
    }
}
