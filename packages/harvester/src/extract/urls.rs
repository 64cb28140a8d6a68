//! URL resolution against the page URL.

use url::Url;

/// Resolve `raw` against `base`.
///
/// Absolute http(s) URLs pass through untouched, anything else is joined
/// against the page URL. Empty or malformed references yield `None`.
pub fn absolutize(base: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Url::parse(raw).ok().map(|_| raw.to_string());
    }

    match base.join(raw) {
        Ok(joined) => Some(joined.to_string()),
        Err(e) => {
            tracing::debug!(base = %base, reference = raw, error = %e, "Dropping unresolvable URL");
            None
        }
    }
}

/// Lowercased host of a URL, if it has one.
pub fn domain_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/blog/post.html").unwrap()
    }

    #[test]
    fn test_absolute_passes_through() {
        assert_eq!(
            absolutize(&base(), "https://other.example/a?b=1").as_deref(),
            Some("https://other.example/a?b=1")
        );
    }

    #[test]
    fn test_relative_is_joined() {
        assert_eq!(
            absolutize(&base(), "../img/a.png").as_deref(),
            Some("https://example.com/img/a.png")
        );
        assert_eq!(
            absolutize(&base(), "/about").as_deref(),
            Some("https://example.com/about")
        );
        assert_eq!(
            absolutize(&base(), "//cdn.example/x.js").as_deref(),
            Some("https://cdn.example/x.js")
        );
    }

    #[test]
    fn test_malformed_is_dropped() {
        assert_eq!(absolutize(&base(), ""), None);
        assert_eq!(absolutize(&base(), "   "), None);
        assert_eq!(absolutize(&base(), "http://[::1"), None);
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("https://WWW.Example.com/x").as_deref(), Some("www.example.com"));
        assert_eq!(domain_of("not a url"), None);
    }
}
