//! Entity and metadata extraction from HTML documents.

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use url::Url;

use super::files::{has_file_extension, is_downloadable, FileProbe};
use super::text::clean_text;
use super::urls::absolutize;
use crate::error::{FetchError, FetchResult};
use crate::types::page::{FileRef, ImageRef, LinkRef, MediaRef, PageRecord};

/// Hosts whose links are reported as social media.
pub const SOCIAL_DOMAINS: [&str; 7] = [
    "facebook.com",
    "twitter.com",
    "instagram.com",
    "linkedin.com",
    "youtube.com",
    "x.com",
    "tiktok.com",
];

/// Title given to PDFs embedded through an `<iframe>`.
pub const EMBEDDED_PDF_TITLE: &str = "Embedded PDF";

/// Elements whose text never reaches the body content.
const HIDDEN_TEXT_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

macro_rules! selector {
    ($name:ident, $css:expr) => {
        static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

selector!(TITLE, "title");
selector!(IMG, "img[src]");
selector!(VIDEO, "video, iframe");
selector!(AUDIO, "audio");
selector!(SOURCE, "source[src]");
selector!(IFRAME, "iframe[src]");
selector!(ANCHOR, "a[href]");
selector!(META_DESCRIPTION, r#"meta[name="description"]"#);
selector!(META_KEYWORDS, r#"meta[name="keywords"]"#);
selector!(META_ROBOTS, r#"meta[name="robots"]"#);
selector!(META_AUTHOR, r#"meta[name="author"]"#);
selector!(CANONICAL, r#"link[rel="canonical"]"#);
selector!(OG_TITLE, r#"meta[property="og:title"]"#);
selector!(OG_DESCRIPTION, r#"meta[property="og:description"]"#);
selector!(OG_IMAGE, r#"meta[property="og:image"]"#);
selector!(TWITTER_CARD, r#"meta[name="twitter:card"]"#);
selector!(TWITTER_TITLE, r#"meta[name="twitter:title"]"#);
selector!(TWITTER_DESCRIPTION, r#"meta[name="twitter:description"]"#);
selector!(TWITTER_IMAGE, r#"meta[name="twitter:image"]"#);
selector!(PUBLISHED, r#"meta[property="article:published_time"]"#);
selector!(MODIFIED, r#"meta[property="article:modified_time"]"#);

/// Result of parsing one document.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    /// Record with every field filled except unconfirmed files
    pub record: PageRecord,

    /// Links with a file extension, awaiting a content-type check
    pub file_candidates: Vec<FileRef>,
}

/// Stateless HTML extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse `html` fetched from `page_url`.
    ///
    /// Relative references are resolved against `page_url`. Bodies that are
    /// not valid UTF-8 are decoded lossily.
    pub fn extract(&self, page_url: &str, html: &[u8]) -> FetchResult<ExtractedPage> {
        let base = Url::parse(page_url)
            .map_err(|e| FetchError::Parse(format!("invalid page URL {}: {}", page_url, e)))?;

        let source = String::from_utf8_lossy(html);
        let document = Html::parse_document(&source);

        let mut record = PageRecord::new(page_url);
        record.title = Self::extract_title(&document);
        record.body_content = clean_text(&Self::visible_text(&document));

        record.meta_description = first_attr(&document, &META_DESCRIPTION, "content");
        record.meta_keywords = first_attr(&document, &META_KEYWORDS, "content");
        record.robots = first_attr(&document, &META_ROBOTS, "content");
        record.author = first_attr(&document, &META_AUTHOR, "content");
        record.canonical_url = first_attr(&document, &CANONICAL, "href");
        record.published_date = first_attr(&document, &PUBLISHED, "content");
        record.modified_date = first_attr(&document, &MODIFIED, "content");

        record.open_graph.title = first_attr(&document, &OG_TITLE, "content");
        record.open_graph.description = first_attr(&document, &OG_DESCRIPTION, "content");
        record.open_graph.image = first_attr(&document, &OG_IMAGE, "content");

        record.twitter.card = first_attr(&document, &TWITTER_CARD, "content");
        record.twitter.title = first_attr(&document, &TWITTER_TITLE, "content");
        record.twitter.description = first_attr(&document, &TWITTER_DESCRIPTION, "content");
        record.twitter.image = first_attr(&document, &TWITTER_IMAGE, "content");

        record.images = Self::extract_images(&document, &base);
        record.videos = Self::extract_media(&document, &VIDEO, &base);
        record.audio = Self::extract_media(&document, &AUDIO, &base);
        record.links = Self::extract_links(&document, &base);
        record.social_media = record
            .links
            .iter()
            .filter(|link| is_social(&link.url))
            .cloned()
            .collect();
        record.files = Self::extract_embedded_pdfs(&document, &base);

        let file_candidates = Self::extract_file_candidates(&document, &base);

        debug!(
            url = page_url,
            images = record.images.len(),
            links = record.links.len(),
            file_candidates = file_candidates.len(),
            "Extracted page"
        );

        Ok(ExtractedPage {
            record,
            file_candidates,
        })
    }

    /// Keep the candidates whose HEAD content type is downloadable.
    ///
    /// Probe failures are logged and the file is left out.
    pub async fn confirm_files(
        &self,
        probe: &dyn FileProbe,
        candidates: Vec<FileRef>,
    ) -> Vec<FileRef> {
        let mut confirmed = Vec::new();
        for candidate in candidates {
            match probe.content_type(&candidate.url).await {
                Ok(content_type) if is_downloadable(&content_type) => confirmed.push(candidate),
                Ok(content_type) => {
                    debug!(
                        url = %candidate.url,
                        content_type = %content_type,
                        "Not a downloadable file"
                    );
                }
                Err(e) => {
                    warn!(url = %candidate.url, error = %e, "Failed to HEAD-check file link");
                }
            }
        }
        confirmed
    }

    /// Parse the document and confirm its file links.
    pub async fn extract_with_files(
        &self,
        page_url: &str,
        html: &[u8],
        probe: &dyn FileProbe,
    ) -> FetchResult<PageRecord> {
        let ExtractedPage {
            mut record,
            file_candidates,
        } = self.extract(page_url, html)?;

        let confirmed = self.confirm_files(probe, file_candidates).await;
        record.files.extend(confirmed);
        Ok(record)
    }

    fn extract_title(document: &Html) -> String {
        document
            .select(&TITLE)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default()
    }

    /// Document text joined with spaces, skipping script-like elements.
    fn visible_text(document: &Html) -> String {
        let mut parts = Vec::new();
        for node in document.root_element().descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| HIDDEN_TEXT_TAGS.contains(&el.name()))
            });
            if hidden {
                continue;
            }
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed);
            }
        }
        parts.join(" ")
    }

    fn extract_images(document: &Html, base: &Url) -> Vec<ImageRef> {
        document
            .select(&IMG)
            .filter_map(|img| {
                let el = img.value();
                let src = absolutize(base, el.attr("src")?)?;
                Some(ImageRef {
                    src,
                    alt: attr_or_empty(&img, "alt"),
                    title: attr_or_empty(&img, "title"),
                })
            })
            .collect()
    }

    /// `src` of the element, else the first nested `<source src>`.
    fn extract_media(document: &Html, selector: &Selector, base: &Url) -> Vec<MediaRef> {
        document
            .select(selector)
            .filter_map(|media| {
                let nested = media.select(&SOURCE).next();
                let raw_src = media
                    .value()
                    .attr("src")
                    .filter(|s| !s.trim().is_empty())
                    .or_else(|| nested.and_then(|s| s.value().attr("src")))?;
                let src = absolutize(base, raw_src)?;

                let media_type = media
                    .value()
                    .attr("type")
                    .or_else(|| nested.and_then(|s| s.value().attr("type")))
                    .unwrap_or_default()
                    .to_string();

                Some(MediaRef {
                    src,
                    media_type,
                    title: attr_or_empty(&media, "title"),
                })
            })
            .collect()
    }

    fn extract_links(document: &Html, base: &Url) -> Vec<LinkRef> {
        document
            .select(&ANCHOR)
            .filter_map(|a| {
                let url = absolutize(base, a.value().attr("href")?)?;
                Some(LinkRef {
                    url,
                    text: element_text(&a),
                    title: attr_or_empty(&a, "title"),
                })
            })
            .collect()
    }

    fn extract_embedded_pdfs(document: &Html, base: &Url) -> Vec<FileRef> {
        document
            .select(&IFRAME)
            .filter_map(|iframe| {
                let src = iframe.value().attr("src")?;
                if !src.to_ascii_lowercase().contains(".pdf") {
                    return None;
                }
                let url = absolutize(base, src)?;
                info!(url = %url, "Found embedded PDF");
                Some(FileRef {
                    url,
                    title: EMBEDDED_PDF_TITLE.to_string(),
                })
            })
            .collect()
    }

    fn extract_file_candidates(document: &Html, base: &Url) -> Vec<FileRef> {
        document
            .select(&ANCHOR)
            .filter_map(|a| {
                let url = absolutize(base, a.value().attr("href")?)?;
                if !has_file_extension(&url) {
                    return None;
                }
                let title = match a.value().attr("title") {
                    Some(title) if !title.trim().is_empty() => title.trim().to_string(),
                    _ => element_text(&a),
                };
                Some(FileRef { url, title })
            })
            .collect()
    }
}

/// Whether a link points at a known social network, judged by its host.
pub fn is_social(url: &str) -> bool {
    let Some(host) = super::urls::domain_of(url) else {
        return false;
    };
    SOCIAL_DOMAINS.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

fn first_attr(document: &Html, selector: &Selector, attr: &str) -> String {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

fn attr_or_empty(el: &ElementRef<'_>, attr: &str) -> String {
    el.value().attr(attr).unwrap_or_default().to_string()
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
