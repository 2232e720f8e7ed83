//! Element picking for the interactive `pick` command.

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use super::{generate_selector, match_count, simplify_selector, validate_selector};
use crate::utils::normalize_whitespace;

/// What the user pointed at.
#[derive(Debug, Clone)]
pub enum PickTarget {
    /// Visible text contained in the element (case-insensitive)
    Text(String),
    /// Link target; matches an exact `href` or a resolved URL ending with it
    Href(String),
}

/// Selectors produced for a picked element.
#[derive(Debug, Clone, Serialize)]
pub struct PickReport {
    pub tag: String,
    pub generated: String,
    pub simplified: String,
    pub valid: bool,
    pub match_count: usize,
}

impl PickReport {
    pub fn for_element(document: &Html, element: ElementRef<'_>) -> Self {
        let generated = generate_selector(document, element);
        let simplified = simplify_selector(document, &generated);
        Self {
            tag: element.value().name().to_string(),
            valid: validate_selector(document, &simplified, element),
            match_count: match_count(document, &simplified).unwrap_or(0),
            generated,
            simplified,
        }
    }
}

/// Locate the element the user means, then climb `climb` ancestors.
///
/// Text targets resolve to the deepest element containing the text; href
/// targets resolve to the first matching anchor.
pub fn pick_element<'a>(
    document: &'a Html,
    target: &PickTarget,
    climb: usize,
) -> Option<ElementRef<'a>> {
    let picked = match target {
        PickTarget::Text(needle) => deepest_with_text(document, needle),
        PickTarget::Href(href) => first_anchor(document, href),
    }?;

    let mut current = picked;
    for _ in 0..climb {
        match current.parent().and_then(ElementRef::wrap) {
            Some(parent) if parent.value().name() != "html" => current = parent,
            _ => break,
        }
    }
    Some(current)
}

fn deepest_with_text<'a>(document: &'a Html, needle: &str) -> Option<ElementRef<'a>> {
    let needle = normalize_whitespace(needle).to_lowercase();
    if needle.is_empty() {
        return None;
    }

    let all = Selector::parse("body *").ok()?;
    let mut best: Option<(usize, ElementRef<'a>)> = None;
    for el in document.select(&all) {
        if matches!(el.value().name(), "script" | "style" | "noscript") {
            continue;
        }
        let text = normalize_whitespace(&el.text().collect::<String>()).to_lowercase();
        if !text.contains(&needle) {
            continue;
        }
        // first element in document order wins among equally deep matches
        let depth = el.ancestors().count();
        if best.is_none_or(|(d, _)| depth > d) {
            best = Some((depth, el));
        }
    }
    best.map(|(_, el)| el)
}

fn first_anchor<'a>(document: &'a Html, href: &str) -> Option<ElementRef<'a>> {
    let anchors = Selector::parse("a[href]").ok()?;
    let wanted = href.trim();
    document.select(&anchors).find(|a| {
        a.value()
            .attr("href")
            .is_some_and(|h| h == wanted || wanted.ends_with(h.trim()) && !h.trim().is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <section class="posts">
            <article><h2><a href="/post/2">Second post</a></h2></article>
            <article><h2><a href="/post/1">First post</a></h2></article>
          </section>
        </body></html>
    "#;

    #[test]
    fn test_pick_by_text_finds_deepest() {
        let document = Html::parse_document(PAGE);
        let el = pick_element(&document, &PickTarget::Text("first POST".into()), 0).unwrap();
        assert_eq!(el.value().name(), "a");
        assert_eq!(el.value().attr("href"), Some("/post/1"));
    }

    #[test]
    fn test_pick_climbs_to_container() {
        let document = Html::parse_document(PAGE);
        let el = pick_element(&document, &PickTarget::Text("Second post".into()), 3).unwrap();
        assert_eq!(el.value().name(), "section");

        let report = PickReport::for_element(&document, el);
        assert_eq!(report.simplified, "section.posts");
        assert!(report.valid);
        assert_eq!(report.match_count, 1);
    }

    #[test]
    fn test_pick_by_href() {
        let document = Html::parse_document(PAGE);
        let el = pick_element(
            &document,
            &PickTarget::Href("https://example.com/post/2".into()),
            0,
        )
        .unwrap();
        assert_eq!(el.text().collect::<String>(), "Second post");
    }

    #[test]
    fn test_climb_stops_below_html() {
        let document = Html::parse_document(PAGE);
        let el = pick_element(&document, &PickTarget::Text("First post".into()), 50).unwrap();
        assert_eq!(el.value().name(), "body");
    }

    #[test]
    fn test_missing_target() {
        let document = Html::parse_document(PAGE);
        assert!(pick_element(&document, &PickTarget::Text("nowhere".into()), 0).is_none());
        assert!(pick_element(&document, &PickTarget::Text("  ".into()), 0).is_none());
    }
}
