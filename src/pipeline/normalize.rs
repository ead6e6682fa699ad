//! Currency-symbol normalisation of raw OCR text.
//!
//! Thermal-printed Indian receipts defeat OCR engines in predictable ways:
//! the rupee sign comes back as `¥`, `￥` or even `JPY`, and the amount
//! column mixes `Rs.`, `Rs` and `INR`. Collapsing all of these to `₹` gives
//! the language model a single symbol to reason about. The final currency
//! code is still decided by the parser; this pass only removes noise.
//!
//! ## Rule Order
//!
//! 1. Yen misreads (`JPY`, `¥`, `￥`) → `₹`, skipped entirely when the text
//!    contains Japanese script so genuine yen receipts are left alone.
//! 2. `Rs.` / `Rs` / `INR` tokens (any case, plus trailing whitespace) → `₹`.
//!
//! Both rules only ever produce `₹`, which neither rule matches, so the
//! function is idempotent.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;
use tracing::debug;

const RUPEE: &str = "₹";

/// Apply all currency rules to `text`.
pub fn normalize_currency(text: &str) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }

    let s = replace_yen_misreads(text);
    let s = replace_rupee_tokens(&s);

    if s != text {
        debug!("Normalised currency symbols in OCR text");
    }
    s.into_owned()
}

// ── Rule 1: Yen misreads ─────────────────────────────────────────────────────

static RE_JAPANESE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{Hiragana}\p{Katakana}\p{Han}円]").unwrap());

static RE_YEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bJPY\b\s*|[¥￥]").unwrap());

fn replace_yen_misreads(text: &str) -> Cow<'_, str> {
    if RE_JAPANESE.is_match(text) {
        return Cow::Borrowed(text);
    }
    RE_YEN.replace_all(text, RUPEE)
}

// ── Rule 2: Rs / INR tokens ──────────────────────────────────────────────────

static RE_RUPEE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(rs|inr)(\.?)(\s*)").unwrap());

/// A bare token glued to more letters ("rsvp", "INRs") is a word, not a
/// currency marker, and is kept.
fn replace_rupee_tokens(text: &str) -> Cow<'_, str> {
    RE_RUPEE_TOKEN.replace_all(text, |caps: &Captures<'_>| {
        let whole = &caps[0];
        let bare = caps[2].is_empty() && caps[3].is_empty();
        let end = caps.get(0).map_or(0, |m| m.end());
        let glued_to_word = text[end..]
            .chars()
            .next()
            .is_some_and(char::is_alphabetic);
        if bare && glued_to_word {
            whole.to_string()
        } else {
            RUPEE.to_string()
        }
    })
}
