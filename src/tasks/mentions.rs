//! `@mention` extraction from comment text.

use once_cell::sync::Lazy;
use regex::Regex;

static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").expect("valid mention regex"));

/// Extract the raw `@word` tokens from a comment body, without the `@`.
/// Duplicate tokens are kept once, in first-seen order. Resolution against
/// the user directory happens in the engine.
pub fn extract_mention_tokens(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for cap in MENTION_RE.captures_iter(text) {
        let token = cap[1].to_string();
        if !seen.contains(&token) {
            seen.push(token);
        }
    }
    seen
}
