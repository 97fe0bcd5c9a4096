//! Markup stripping ahead of synthesis.
//!
//! LLM output is Markdown. Emphasis stars, heading hashes and code-fence backticks
//! are either read aloud or produce odd pauses, so they are removed; underscores
//! become spaces so `snake_case` reads as two words.

/// Characters dropped outright.
const STRIPPED: &[char] = &['*', '#', '`'];

/// Remove markup noise from `text`. Pure and idempotent.
///
/// Runs of spaces created by the replacements are collapsed; newlines and all
/// other characters are kept in order.
pub fn clean_for_speech(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_space = false;
    for c in text.chars() {
        if STRIPPED.contains(&c) {
            continue;
        }
        let c = if c == '_' { ' ' } else { c };
        if c == ' ' {
            if prev_space {
                continue;
            }
            prev_space = true;
        } else {
            prev_space = false;
        }
        out.push(c);
    }
    out
}

/// True when nothing speakable remains after cleaning.
pub fn is_blank(text: &str) -> bool {
    clean_for_speech(text).trim().is_empty()
}
