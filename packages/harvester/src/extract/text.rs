//! Body text cleanup.

use regex::Regex;
use std::sync::LazyLock;

/// Site chrome that carries no content. Matched on word boundaries so
/// "homework" or "research" survive.
static BOILERPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        concat!(
            r"(?i)\b(?:skip to main content|sign in|subscribe|log in|privacy policy|search|home",
            r"|about|contact|more|follow us|terms of use|cookie preferences|top 10|trending)\b",
            r"|©\s*\d{4}",
        ),
    )
    .unwrap()
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Strip boilerplate phrases and collapse whitespace.
pub fn clean_text(raw: &str) -> String {
    let stripped = BOILERPLATE.replace_all(raw, " ");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}
