//! Referenced-asset extraction from a landing page (§4.4.3 step 2, grounded
//! on `WebsiteAnalyzer._retrieve_included_assets`).

use reqwest::Url;
use scraper::{Html, Selector};

use crate::normalize::pick_kind;

const RELEVANT_SELECTOR: &str = "a, link, script, style, img";
const SUPPORTED_SCHEMES: &[&str] = &["http", "https"];

/// Extract candidate static-asset URLs referenced by `html`, resolved
/// against `base_url`. Only URLs whose basename resolves to a recognized
/// [`crate::normalize::FileKind`] are returned; empty-scheme (relative) and
/// `http`/`https` URLs are followed, other schemes (`mailto:`, `tel:`, ...)
/// are skipped.
#[must_use]
pub fn extract_referenced_assets(html: &[u8], base_url: &Url) -> Vec<Url> {
    let text = String::from_utf8_lossy(html);
    let document = Html::parse_document(&text);
    let selector = Selector::parse(RELEVANT_SELECTOR).expect("static selector is valid");

    let mut referenced = Vec::new();
    for element in document.select(&selector) {
        if let Some(href) = element.value().attr("href") {
            referenced.push(href.to_string());
        }
        if let Some(src) = element.value().attr("src") {
            referenced.push(src.to_string());
        }
    }

    let mut assets = Vec::new();
    for raw in referenced {
        let Some(resolved) = resolve(&raw, base_url) else {
            continue;
        };
        let basename = resolved
            .path_segments()
            .and_then(Iterator::last)
            .unwrap_or("");
        if basename.is_empty() {
            continue;
        }
        // Every basename resolves to *some* FileKind (Extensionless is a
        // catch-all); we only treat files with a recognizable static-asset
        // extension as worth probing.
        let kind = pick_kind(basename);
        if matches!(
            kind,
            crate::normalize::FileKind::JavaScript
                | crate::normalize::FileKind::Json
                | crate::normalize::FileKind::Yaml
                | crate::normalize::FileKind::Css
                | crate::normalize::FileKind::Html
                | crate::normalize::FileKind::Image
        ) {
            assets.push(resolved);
        }
    }
    assets
}

fn resolve(raw: &str, base_url: &Url) -> Option<Url> {
    if let Ok(absolute) = Url::parse(raw) {
        if !SUPPORTED_SCHEMES.contains(&absolute.scheme()) {
            return None;
        }
        return Some(absolute);
    }
    base_url.join(raw).ok()
}

/// The favicon URL regarded unconditionally alongside page-referenced
/// assets (§4.4.3 step 2).
#[must_use]
pub fn favicon_url(base_url: &Url) -> Option<Url> {
    base_url.join("/favicon.ico").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_script_and_link_assets() {
        let base = Url::parse("https://example.com/").unwrap();
        let html = br#"
            <html><head>
            <link rel="stylesheet" href="/css/style.css">
            <script src="js/app.js"></script>
            <a href="mailto:nobody@example.com">mail</a>
            <a href="/about">about</a>
            </head></html>
        "#;
        let assets = extract_referenced_assets(html, &base);
        let urls: Vec<String> = assets.iter().map(ToString::to_string).collect();
        assert!(urls.contains(&"https://example.com/css/style.css".to_string()));
        assert!(urls.contains(&"https://example.com/js/app.js".to_string()));
        assert!(!urls.iter().any(|u| u.starts_with("mailto:")));
        assert!(!urls.contains(&"https://example.com/about".to_string()));
    }

    #[test]
    fn favicon_is_rooted_at_the_site() {
        let base = Url::parse("https://example.com/blog/post").unwrap();
        assert_eq!(
            favicon_url(&base).unwrap().as_str(),
            "https://example.com/favicon.ico"
        );
    }
}
