//! Anchor collection.

use std::collections::HashSet;

use scraper::ElementRef;
use url::Url;

use crate::utils::url::normalize_href;

/// Normalized hrefs of `container` and its descendant anchors.
///
/// Unusable hrefs (`#...`, `javascript:`, empty, non-http) are skipped and
/// duplicates are dropped, keeping first-seen document order.
pub fn collect_links(container: ElementRef<'_>, base: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    anchors(container)
        .filter_map(|(_, href)| normalize_href(base, href))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Distinct usable links under `container`.
pub fn count_links(container: ElementRef<'_>, base: &Url) -> usize {
    anchors(container)
        .filter_map(|(_, href)| normalize_href(base, href))
        .collect::<HashSet<_>>()
        .len()
}

/// `<a href>` elements in document order, `container` included.
pub fn anchors<'a>(container: ElementRef<'a>) -> impl Iterator<Item = (ElementRef<'a>, &'a str)> {
    container
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "a")
        .filter_map(|el| el.value().attr("href").map(|href| (el, href)))
}
