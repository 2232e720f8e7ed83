// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

/// Resolve an anchor `href` against the page URL.
///
/// Returns `None` for hrefs that do not point at another document:
/// empty values, in-page fragments, `javascript:` pseudo-links and any
/// non-http(s) scheme. The fragment of the resolved URL is dropped so
/// `/post/1#comments` and `/post/1` collapse to one entry.
///
/// # Examples
/// ```
/// use listwatch::utils::url::normalize_href;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/blog/").unwrap();
/// assert_eq!(
///     normalize_href(&base, "post/1#top"),
///     Some("https://example.com/blog/post/1".to_string())
/// );
/// assert_eq!(normalize_href(&base, "javascript:void(0)"), None);
/// ```
pub fn normalize_href(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    if href
        .get(..11)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("javascript:"))
    {
        return None;
    }

    let mut resolved = base.join(href).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

/// Normalize an already absolute URL the same way `normalize_href` does.
pub fn normalize_absolute(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Extract domain from a URL.
pub fn get_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_lowercase()))
}
