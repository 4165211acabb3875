//! Text cleanup applied to quotes before they are returned.
//!
//! The archive was transcribed with OCR, which often reads a capital `I` as
//! a pipe. Two literal replacements run in order:
//! 1. `|` becomes `I`
//! 2. `alI` becomes `all`
//!
//! The second pass only repairs words the first one produced, e.g. `al|`.

/// Repair OCR artifacts in a quote text.
pub fn clean_quote_text(text: &str) -> String {
    text.replace('|', "I").replace("alI", "all")
}
