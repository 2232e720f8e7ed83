// src/extract/mod.rs

//! Link-list extraction and diffing.
//!
//! `ListDiffEngine` turns a page and a container selector into the ordered
//! list of item URLs, and can recover the container from previously seen
//! URLs when the selector has drifted. The HTML-level operations are pure
//! so a caller holding an already fetched page can run several strategies
//! against it.

mod hierarchy;
mod lca;
mod links;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use scraper::{Html, Selector};
use url::Url;

use crate::fetch::{FetchOptions, FetchResult, PageFetcher, elapsed_ms};
use crate::models::{ExtractConfig, ListDiffResult, UrlLookupResult};

pub use hierarchy::{element_selector, serialize_hierarchy};
pub use lca::{ResolvedContainer, resolve_container};
pub use links::{collect_links, count_links};

/// URLs of `current` missing from `previous`, in `current` order.
pub fn diff_urls(previous: &[String], current: &[String]) -> Vec<String> {
    let seen: HashSet<&str> = previous.iter().map(String::as_str).collect();
    current
        .iter()
        .filter(|url| !seen.contains(url.as_str()))
        .cloned()
        .collect()
}

/// Extracts item URLs from list pages.
pub struct ListDiffEngine {
    fetcher: Arc<dyn PageFetcher>,
    config: ExtractConfig,
}

impl ListDiffEngine {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: ExtractConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Fetch a page without extracting anything.
    pub async fn fetch_page(&self, page_url: &str, options: &FetchOptions) -> FetchResult {
        self.fetcher.fetch(page_url, options).await
    }

    /// Fetch `page_url` and extract the links under `selector`.
    pub async fn fetch(
        &self,
        page_url: &str,
        selector: &str,
        options: &FetchOptions,
    ) -> ListDiffResult {
        let started = Instant::now();
        let page = self.fetch_page(page_url, options).await;

        let mut result = if page.success {
            self.extract_list(&page.content, page_url, selector)
        } else {
            ListDiffResult {
                error: Some(page.describe_error()),
                error_kind: page.error_kind,
                ..ListDiffResult::default()
            }
        };
        result.detected_render_type = page.render_type;
        result.duration_ms = elapsed_ms(started);
        result
    }

    /// Fetch `page_url` and locate the container of `known_urls`.
    pub async fn lookup_urls_in_page(
        &self,
        page_url: &str,
        known_urls: &[String],
        options: &FetchOptions,
    ) -> UrlLookupResult {
        let started = Instant::now();
        let page = self.fetch_page(page_url, options).await;

        let mut result = if page.success {
            self.lookup_in_html(&page.content, page_url, known_urls)
        } else {
            UrlLookupResult {
                error: Some(page.describe_error()),
                error_kind: page.error_kind,
                ..UrlLookupResult::default()
            }
        };
        result.detected_render_type = page.render_type;
        result.duration_ms = elapsed_ms(started);
        result
    }

    /// Extract the links under the first match of `selector` in `html`.
    pub fn extract_list(&self, html: &str, page_url: &str, selector: &str) -> ListDiffResult {
        let base = match Url::parse(page_url) {
            Ok(base) => base,
            Err(e) => return ListDiffResult::failure(format!("Invalid page URL {page_url}: {e}")),
        };
        let parsed = match Selector::parse(selector) {
            Ok(parsed) => parsed,
            Err(e) => return ListDiffResult::failure(format!("Invalid selector: {e}")),
        };

        let document = Html::parse_document(html);
        let Some(container) = document.select(&parsed).next() else {
            return ListDiffResult::failure(format!("Selector not found: {selector}"));
        };

        let urls = collect_links(container, &base);
        if urls.is_empty() {
            return ListDiffResult::failure("No URLs found in the selected container");
        }

        ListDiffResult {
            success: true,
            urls,
            container_selector: Some(element_selector(container)),
            selector_hierarchy: Some(serialize_hierarchy(container, &self.config)),
            ..ListDiffResult::default()
        }
    }

    /// Locate `known_urls` in `html` and re-extract their container.
    pub fn lookup_in_html(
        &self,
        html: &str,
        page_url: &str,
        known_urls: &[String],
    ) -> UrlLookupResult {
        if known_urls.is_empty() {
            return UrlLookupResult::not_found();
        }
        let Ok(base) = Url::parse(page_url) else {
            return UrlLookupResult {
                error: Some(format!("Invalid page URL {page_url}")),
                ..UrlLookupResult::not_found()
            };
        };

        let document = Html::parse_document(html);
        let Some(resolved) = resolve_container(&document, &base, known_urls, &self.config) else {
            return UrlLookupResult::not_found();
        };

        UrlLookupResult {
            found: true,
            found_urls: resolved.found_urls,
            urls: collect_links(resolved.element, &base),
            container_selector: Some(element_selector(resolved.element)),
            selector_hierarchy: Some(serialize_hierarchy(resolved.element, &self.config)),
            ..UrlLookupResult::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchErrorKind, FixtureFetcher, SmartFetcher};
    use crate::models::{RenderType, SufficiencyConfig};

    const PAGE_URL: &str = "https://example.com/posts";

    fn posts_page(ids: &[u32]) -> String {
        let articles: String = ids
            .iter()
            .map(|id| format!("<article class=\"post\"><a href=\"/post/{id}\">Post {id}</a></article>"))
            .collect();
        format!(
            "<html><body><nav><a href=\"/\">Home</a></nav><main><section class=\"posts\">{articles}</section></main></body></html>"
        )
    }

    fn engine_with(fetcher: FixtureFetcher) -> ListDiffEngine {
        ListDiffEngine::new(Arc::new(fetcher), ExtractConfig::default())
    }

    fn engine() -> ListDiffEngine {
        engine_with(FixtureFetcher::new())
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_diff_urls() {
        let prev = strings(&["p3", "p2", "p1"]);
        let curr = strings(&["p4", "p3", "p2", "p1"]);
        assert_eq!(diff_urls(&prev, &curr), strings(&["p4"]));
        assert_eq!(diff_urls(&[], &curr), curr);
        assert!(diff_urls(&prev, &[]).is_empty());
        assert!(diff_urls(&prev, &prev).is_empty());
    }

    #[test]
    fn test_diff_preserves_current_order() {
        let prev = strings(&["b"]);
        let curr = strings(&["d", "b", "a", "c"]);
        assert_eq!(diff_urls(&prev, &curr), strings(&["d", "a", "c"]));
    }

    #[test]
    fn test_extract_list() {
        let result = engine().extract_list(&posts_page(&[3, 2, 1]), PAGE_URL, "section.posts");
        assert!(result.success);
        assert_eq!(
            result.urls,
            strings(&[
                "https://example.com/post/3",
                "https://example.com/post/2",
                "https://example.com/post/1",
            ])
        );
        assert_eq!(result.container_selector.as_deref(), Some("section.posts"));
        assert!(result.selector_hierarchy.unwrap().starts_with("<section class=\"posts\">"));
    }

    #[test]
    fn test_missing_selector() {
        let result = engine().extract_list(&posts_page(&[1]), PAGE_URL, "ul.items");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Selector not found: ul.items"));
    }

    #[test]
    fn test_container_without_links() {
        let html = "<html><body><section class=\"posts\"><a href=\"javascript:void(0)\">x</a><a href=\"#top\">top</a></section></body></html>";
        let result = engine().extract_list(html, PAGE_URL, "section.posts");
        assert!(!result.success);
        assert!(result.error.unwrap().contains("No URLs found"));
    }

    #[test]
    fn test_invalid_selector() {
        let result = engine().extract_list(&posts_page(&[1]), PAGE_URL, "div[[");
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Invalid selector:"));
    }

    #[test]
    fn test_lookup_recovers_drifted_container() {
        // the section lost its class in a redesign
        let html = posts_page(&[4, 3, 2]).replace("section class=\"posts\"", "section");
        let known = strings(&["https://example.com/post/3", "https://example.com/post/2"]);

        let result = engine().lookup_in_html(&html, PAGE_URL, &known);
        assert!(result.found);
        assert_eq!(result.found_urls, known);
        assert_eq!(result.urls.len(), 3);
        assert_eq!(result.urls[0], "https://example.com/post/4");
        assert_eq!(result.container_selector.as_deref(), Some("section"));
    }

    #[test]
    fn test_lookup_without_matches() {
        let known = strings(&["https://example.com/post/99"]);
        let result = engine().lookup_in_html(&posts_page(&[1, 2]), PAGE_URL, &known);
        assert!(!result.found);
        assert!(result.found_urls.is_empty());

        let result = engine().lookup_in_html(&posts_page(&[1, 2]), PAGE_URL, &[]);
        assert!(!result.found);
    }

    #[tokio::test]
    async fn test_fetch_reports_render_type_and_errors() {
        let fetcher = FixtureFetcher::new().with_page(PAGE_URL, &posts_page(&[2, 1]));
        fetcher.set_failure("https://example.com/down", FetchErrorKind::Timeout);
        let engine = engine_with(fetcher);

        let result = engine
            .fetch(PAGE_URL, "section.posts", &FetchOptions::default())
            .await;
        assert!(result.success);
        assert_eq!(result.urls.len(), 2);
        assert_eq!(result.detected_render_type, RenderType::Static);

        let failed = engine
            .fetch(
                "https://example.com/down",
                "section.posts",
                &FetchOptions::default(),
            )
            .await;
        assert!(!failed.success);
        assert_eq!(failed.error_kind, Some(FetchErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_shell_kept_after_failed_render_is_not_detected_static() {
        let shell = format!(
            "<html><head>{}</head><body><ul class=\"posts\">\
             <li><a href=\"/post/1\">One</a></li><li><a href=\"/post/2\">Two</a></li></ul>\
             <div id=\"root\"></div></body></html>",
            "<script>window.__STATE__ = {user: null, locale: 'en'};</script>".repeat(20)
        );
        let rendered = FixtureFetcher::new();
        rendered.set_failure(PAGE_URL, FetchErrorKind::Timeout);
        let fetcher = SmartFetcher::new(
            Arc::new(FixtureFetcher::new().with_page(PAGE_URL, &shell)),
            Some(Arc::new(rendered)),
            SufficiencyConfig::default(),
        );
        let engine = ListDiffEngine::new(Arc::new(fetcher), ExtractConfig::default());

        let result = engine
            .fetch(PAGE_URL, "ul.posts", &FetchOptions::default())
            .await;
        assert!(result.success);
        assert_eq!(result.urls.len(), 2);
        assert_eq!(result.detected_render_type, RenderType::Unknown);
    }

    #[tokio::test]
    async fn test_lookup_urls_in_page_fetches() {
        let fetcher = FixtureFetcher::new().with_page(PAGE_URL, &posts_page(&[5, 4]));
        let engine = engine_with(fetcher);

        let result = engine
            .lookup_urls_in_page(
                PAGE_URL,
                &strings(&["https://example.com/post/4"]),
                &FetchOptions::default(),
            )
            .await;
        assert!(result.found);
        assert_eq!(result.urls.len(), 2);
    }
}
