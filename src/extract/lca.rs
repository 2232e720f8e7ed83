//! Container recovery from previously seen URLs.

use std::collections::{HashMap, HashSet};

use scraper::{ElementRef, Html};
use url::Url;

use super::links::{anchors, count_links};
use crate::models::ExtractConfig;
use crate::utils::url::{normalize_absolute, normalize_href};

/// Container located by reverse lookup.
#[derive(Debug)]
pub struct ResolvedContainer<'a> {
    pub element: ElementRef<'a>,
    /// Known URLs that were found on the page, in input order
    pub found_urls: Vec<String>,
}

/// Locate the list container holding `known_urls`.
///
/// With several matches the container is their lowest common ancestor.
/// With a single match, ancestors are climbed until one holds at least
/// `container_min_links` links, falling back to the matched anchor.
pub fn resolve_container<'a>(
    document: &'a Html,
    base: &Url,
    known_urls: &[String],
    config: &ExtractConfig,
) -> Option<ResolvedContainer<'a>> {
    let mut by_href: HashMap<String, ElementRef<'a>> = HashMap::new();
    for (anchor, href) in anchors(document.root_element()) {
        if let Some(url) = normalize_href(base, href) {
            by_href.entry(url).or_insert(anchor);
        }
    }

    let mut found_urls = Vec::new();
    let mut matched: Vec<ElementRef<'a>> = Vec::new();
    let mut seen_nodes = HashSet::new();
    for known in known_urls {
        let key = normalize_absolute(known).unwrap_or_else(|| known.clone());
        if let Some(anchor) = by_href.get(&key) {
            found_urls.push(known.clone());
            if seen_nodes.insert(anchor.id()) {
                matched.push(*anchor);
            }
        }
    }

    let element = match matched.as_slice() {
        [] => return None,
        [single] => climb_to_container(*single, base, config),
        many => lowest_common_ancestor(many),
    };

    Some(ResolvedContainer {
        element,
        found_urls,
    })
}

/// Deepest node shared by every element's ancestor chain, below `body`.
///
/// Falls back to `body` (or the document root) when the chains diverge
/// immediately.
fn lowest_common_ancestor<'a>(elements: &[ElementRef<'a>]) -> ElementRef<'a> {
    let chains: Vec<Vec<ElementRef<'a>>> = elements.iter().map(|el| chain_below_body(*el)).collect();
    let shortest = chains.iter().map(Vec::len).min().unwrap_or(0);

    let mut lca = None;
    for depth in 0..shortest {
        let candidate = chains[0][depth];
        if chains.iter().all(|chain| chain[depth].id() == candidate.id()) {
            lca = Some(candidate);
        } else {
            break;
        }
    }

    lca.unwrap_or_else(|| body_of(elements[0]))
}

/// Root-to-element chain, excluding `html` and `body`.
fn chain_below_body(element: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut chain: Vec<ElementRef<'_>> = std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .take_while(|el| !matches!(el.value().name(), "body" | "html"))
        .collect();
    chain.reverse();
    chain
}

fn body_of(element: ElementRef<'_>) -> ElementRef<'_> {
    let mut top = element;
    for ancestor in element.ancestors().filter_map(ElementRef::wrap) {
        top = ancestor;
        if ancestor.value().name() == "body" {
            break;
        }
    }
    top
}

/// Climb from a lone match until an ancestor looks like a list.
fn climb_to_container<'a>(
    element: ElementRef<'a>,
    base: &Url,
    config: &ExtractConfig,
) -> ElementRef<'a> {
    let mut current = element;
    for _ in 0..config.climb_depth {
        let Some(parent) = current.parent().and_then(ElementRef::wrap) else {
            break;
        };
        if count_links(parent, base) >= config.container_min_links {
            return parent;
        }
        current = parent;
    }
    element
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    fn urls(paths: &[&str]) -> Vec<String> {
        paths
            .iter()
            .map(|p| format!("https://example.com{p}"))
            .collect()
    }

    const PAGE: &str = r#"
        <html><body>
          <nav><a href="/">Home</a><a href="/about">About</a></nav>
          <main>
            <div class="feed">
              <section class="list">
                <article><a href="/post/3">3</a></article>
                <article><a href="/post/2">2</a></article>
                <article><a href="/post/1">1</a></article>
              </section>
            </div>
          </main>
        </body></html>
    "#;

    #[test]
    fn test_multiple_matches_resolve_to_lowest_common_ancestor() {
        let document = Html::parse_document(PAGE);
        let resolved = resolve_container(
            &document,
            &base(),
            &urls(&["/post/3", "/post/1", "/gone"]),
            &ExtractConfig::default(),
        )
        .unwrap();

        assert_eq!(resolved.element.value().name(), "section");
        assert_eq!(resolved.found_urls, urls(&["/post/3", "/post/1"]));
    }

    #[test]
    fn test_single_match_climbs_until_two_links() {
        let document = Html::parse_document(PAGE);
        let resolved = resolve_container(
            &document,
            &base(),
            &urls(&["/post/2"]),
            &ExtractConfig::default(),
        )
        .unwrap();

        // article holds one link, section holds three
        assert_eq!(resolved.element.value().name(), "section");
    }

    #[test]
    fn test_single_match_without_list_falls_back_to_anchor() {
        let document = Html::parse_document(
            r#"<html><body><div><p><a href="/only">only</a></p></div></body></html>"#,
        );
        let resolved = resolve_container(
            &document,
            &base(),
            &urls(&["/only"]),
            &ExtractConfig::default(),
        )
        .unwrap();
        assert_eq!(resolved.element.value().name(), "a");
    }

    #[test]
    fn test_no_match_is_none() {
        let document = Html::parse_document(PAGE);
        assert!(
            resolve_container(
                &document,
                &base(),
                &urls(&["/elsewhere"]),
                &ExtractConfig::default()
            )
            .is_none()
        );
    }

    #[test]
    fn test_matches_in_different_regions_resolve_to_body() {
        let document = Html::parse_document(PAGE);
        let resolved = resolve_container(
            &document,
            &base(),
            &urls(&["/about", "/post/1"]),
            &ExtractConfig::default(),
        )
        .unwrap();
        assert_eq!(resolved.element.value().name(), "body");
    }

    #[test]
    fn test_known_urls_match_despite_fragments() {
        let document = Html::parse_document(PAGE);
        let known = vec![
            "https://example.com/post/3#comments".to_string(),
            "https://example.com/post/2".to_string(),
        ];
        let resolved =
            resolve_container(&document, &base(), &known, &ExtractConfig::default()).unwrap();
        assert_eq!(resolved.found_urls.len(), 2);
        assert_eq!(resolved.element.value().name(), "section");
    }
}
