//! Pruned snapshot of a container subtree.
//!
//! The snapshot is what the selector advisor sees. It keeps the tree shape
//! and the attributes useful for writing selectors, and nothing else:
//!
//! ```text
//! <section class="posts">
//!   <article class="post">
//!     <a href="https://example.com/post/3">Three</a>
//!   </article>
//!   <!-- 9 more -->
//! </section>
//! ```

use std::fmt::Write;

use scraper::ElementRef;

use crate::models::ExtractConfig;
use crate::selector::classes::{is_stable_token, stable_classes};
use crate::utils::{normalize_whitespace, truncate_chars};

/// Attributes kept besides `id`, `class` and `href`.
const KEPT_ATTRIBUTES: [&str; 3] = ["role", "data-testid", "aria-label"];

/// Elements that never carry list content.
const SKIPPED_TAGS: [&str; 6] = ["script", "style", "noscript", "template", "svg", "iframe"];

/// Serialize `root` bounded by `config`.
pub fn serialize_hierarchy(root: ElementRef<'_>, config: &ExtractConfig) -> String {
    let mut out = String::new();
    write_element(&mut out, root, 0, config);
    out.truncate(out.trim_end().len());
    out
}

/// Coarse selector for a node: `#id`, `tag.class...` or the bare tag.
///
/// Only used as a hint for later fetches, so it makes no uniqueness
/// promise.
pub fn element_selector(element: ElementRef<'_>) -> String {
    let value = element.value();
    if let Some(id) = value.id().filter(|id| is_stable_token(id)) {
        return format!("#{id}");
    }

    let classes = stable_classes(value.classes());
    if classes.is_empty() {
        value.name().to_string()
    } else {
        format!("{}.{}", value.name(), classes.join("."))
    }
}

fn write_element(out: &mut String, element: ElementRef<'_>, depth: usize, config: &ExtractConfig) {
    let indent = "  ".repeat(depth);
    let tag = element.value().name();
    let open = open_tag(element, config);
    let text = own_text(element, config.text_max_chars);

    let children: Vec<ElementRef<'_>> = element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| !SKIPPED_TAGS.contains(&child.value().name()))
        .collect();

    if children.is_empty() {
        let _ = writeln!(out, "{indent}{open}{text}</{tag}>");
        return;
    }

    if depth + 1 >= config.hierarchy_depth {
        let _ = writeln!(out, "{indent}{open}{text}…</{tag}>");
        return;
    }

    let _ = writeln!(out, "{indent}{open}{text}");
    for child in children.iter().take(config.max_children) {
        write_element(out, *child, depth + 1, config);
    }
    if children.len() > config.max_children {
        let _ = writeln!(
            out,
            "{indent}  <!-- {} more -->",
            children.len() - config.max_children
        );
    }
    let _ = writeln!(out, "{indent}</{tag}>");
}

fn open_tag(element: ElementRef<'_>, config: &ExtractConfig) -> String {
    let value = element.value();
    let mut tag = format!("<{}", value.name());

    if let Some(id) = value.id().filter(|id| is_stable_token(id)) {
        push_attr(&mut tag, "id", id);
    }

    let classes = stable_classes(value.classes());
    if !classes.is_empty() {
        push_attr(&mut tag, "class", &classes.join(" "));
    }

    for name in KEPT_ATTRIBUTES {
        if let Some(attr) = value.attr(name).filter(|a| !a.trim().is_empty()) {
            push_attr(&mut tag, name, &truncate_chars(attr.trim(), config.text_max_chars));
        }
    }

    if let Some(href) = value.attr("href").filter(|h| !h.trim().is_empty()) {
        push_attr(&mut tag, "href", &truncate_chars(href.trim(), config.href_max_chars));
    }

    tag.push('>');
    tag
}

fn push_attr(tag: &mut String, name: &str, value: &str) {
    let _ = write!(tag, " {name}=\"{}\"", value.replace('"', "&quot;"));
}

/// Text directly inside `element`, excluding its children.
fn own_text(element: ElementRef<'_>, max: usize) -> String {
    let raw: String = element
        .children()
        .filter_map(|node| node.value().as_text().map(|t| t.to_string()))
        .collect::<Vec<_>>()
        .join(" ");
    truncate_chars(&normalize_whitespace(&raw), max)
}

#[cfg(test)]
mod tests {
    use scraper::{Html, Selector};

    use super::*;

    fn select<'a>(document: &'a Html, selector: &str) -> ElementRef<'a> {
        let sel = Selector::parse(selector).unwrap();
        document.select(&sel).next().unwrap()
    }

    #[test]
    fn test_snapshot_prunes_attributes_and_dynamic_classes() {
        let document = Html::parse_document(
            r#"<ul class="posts sc-x7Yz1" style="color:red" data-track="1">
                <li class="item css-9a8b7c" role="listitem">
                  <a href="/post/1" target="_blank">First post</a>
                </li>
            </ul>"#,
        );
        let snapshot = serialize_hierarchy(select(&document, "ul"), &ExtractConfig::default());

        assert_eq!(
            snapshot,
            "<ul class=\"posts\">\n  <li class=\"item\" role=\"listitem\">\n    <a href=\"/post/1\">First post</a>\n  </li>\n</ul>"
        );
    }

    #[test]
    fn test_snapshot_truncates_href_and_text() {
        let long_href = format!("/articles/{}", "x".repeat(80));
        let html = format!(
            "<div><a href=\"{long_href}\">{}</a></div>",
            "A very long headline that keeps going and going"
        );
        let document = Html::parse_document(&html);
        let snapshot = serialize_hierarchy(select(&document, "div"), &ExtractConfig::default());

        let expected_href = format!("{}…", &long_href[..50]);
        assert!(snapshot.contains(&expected_href), "{snapshot}");
        assert!(snapshot.contains("A very long headline that keep…"), "{snapshot}");
    }

    #[test]
    fn test_snapshot_respects_depth_and_child_bounds() {
        let items: String = (0..20)
            .map(|i| format!("<li><div><p><span><b>{i}</b></span></p></div></li>"))
            .collect();
        let document = Html::parse_document(&format!("<ul>{items}</ul>"));
        let config = ExtractConfig {
            hierarchy_depth: 3,
            max_children: 4,
            ..ExtractConfig::default()
        };
        let snapshot = serialize_hierarchy(select(&document, "ul"), &config);

        assert_eq!(snapshot.matches("<li>").count(), 4);
        assert!(snapshot.contains("<!-- 16 more -->"));
        assert!(!snapshot.contains("<p>"));
        assert!(snapshot.contains("<div>…</div>"));
    }

    #[test]
    fn test_scripts_are_skipped() {
        let document =
            Html::parse_document("<div><script>var x = 1;</script><a href=\"/a\">A</a></div>");
        let snapshot = serialize_hierarchy(select(&document, "div"), &ExtractConfig::default());
        assert!(!snapshot.contains("script"));
    }

    #[test]
    fn test_element_selector_forms() {
        let document = Html::parse_document(
            r#"<main id="feed"><ul class="posts css-1ab2c3 featured"><li><span class="_x9Yq2">t</span></li></ul></main>"#,
        );
        assert_eq!(element_selector(select(&document, "main")), "#feed");
        assert_eq!(
            element_selector(select(&document, "ul")),
            "ul.posts.featured"
        );
        assert_eq!(element_selector(select(&document, "li")), "li");
        assert_eq!(element_selector(select(&document, "span")), "span");
    }
}
