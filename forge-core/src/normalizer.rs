use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::error::{CoreResult, ForgeError};

static APP_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("static regex"));

fn clean_text(s: &str) -> String {
    // Unicode NFC normalization + BOM strip + CRLF -> LF + trim
    let mut t = s.nfc().collect::<String>();
    if t.starts_with('\u{FEFF}') {
        t.remove(0);
    }
    if t.contains("\r\n") {
        t = t.replace("\r\n", "\n");
    }
    t.trim().to_string()
}

/// Clean a chat prompt before it goes on the wire. Empty prompts are rejected.
pub fn normalize_message(message: &str) -> CoreResult<String> {
    let cleaned = clean_text(message);
    if cleaned.is_empty() {
        return Err(ForgeError::Validation("message must not be empty".into()));
    }
    Ok(cleaned)
}

/// App ids end up as URL path segments; only allow a conservative alphabet.
pub fn validate_app_id(app_id: &str) -> CoreResult<&str> {
    if APP_ID.is_match(app_id) {
        Ok(app_id)
    } else {
        Err(ForgeError::Validation(format!("invalid app id '{app_id}'")))
    }
}
