// src/selector/mod.rs

//! CSS selector generation for a picked element.
//!
//! Selectors are built bottom-up from the picked element toward the root.
//! Each ancestor contributes one compound segment, in order of preference:
//!
//! 1. a stable `#id` (ends the walk),
//! 2. `tag.class1.class2` using up to two stable classes,
//! 3. `tag[attr="value"]` for a semantic attribute,
//! 4. `tag:nth-of-type(n)`.
//!
//! The walk also ends as soon as the accumulated path matches exactly one
//! element. When uniqueness is never reached the full path is returned, so
//! callers must not assume the result is unique.

pub mod classes;
pub mod picker;

use scraper::{ElementRef, Html, Selector};

use classes::{is_stable_token, stable_classes};

pub use picker::{PickReport, PickTarget, pick_element};

/// Attributes that usually carry authored, meaningful values.
const SEMANTIC_ATTRIBUTES: [&str; 4] = ["role", "data-testid", "aria-label", "name"];

/// Stable classes used per segment.
const MAX_SEGMENT_CLASSES: usize = 2;

/// Child combinator joining path segments.
const SEGMENT_SEPARATOR: &str = " > ";

/// Build a short, preferably unique selector for `element`.
pub fn generate_selector(document: &Html, element: ElementRef<'_>) -> String {
    let mut segments: Vec<String> = Vec::new();
    let mut current = Some(element);

    while let Some(node) = current {
        let (segment, is_id) = describe_segment(node);
        segments.push(segment);

        if is_id {
            break;
        }
        if match_count(document, &join_segments(&segments)) == Some(1) {
            break;
        }

        current = parent_element(node);
    }

    join_segments(&segments)
}

/// Shorten a generated selector to its shortest unique suffix.
///
/// Suffixes are tried from the last segment outward; the input is returned
/// unchanged when no suffix is unique.
pub fn simplify_selector(document: &Html, selector: &str) -> String {
    let segments: Vec<&str> = selector.split(SEGMENT_SEPARATOR).collect();

    for start in (0..segments.len()).rev() {
        let candidate = segments[start..].join(SEGMENT_SEPARATOR);
        if match_count(document, &candidate) == Some(1) {
            return candidate;
        }
    }

    selector.to_string()
}

/// Whether `selector` parses and selects `element`.
pub fn validate_selector(document: &Html, selector: &str, element: ElementRef<'_>) -> bool {
    match Selector::parse(selector) {
        Ok(parsed) => document.select(&parsed).any(|e| e.id() == element.id()),
        Err(_) => false,
    }
}

/// Number of elements matched by `selector`, `None` when it does not parse.
pub fn match_count(document: &Html, selector: &str) -> Option<usize> {
    Selector::parse(selector)
        .ok()
        .map(|parsed| document.select(&parsed).count())
}

fn describe_segment(node: ElementRef<'_>) -> (String, bool) {
    let element = node.value();

    if let Some(id) = element.id() {
        if is_stable_token(id) {
            return (format!("#{id}"), true);
        }
    }

    let tag = element.name();

    let classes: Vec<&str> = stable_classes(element.classes())
        .into_iter()
        .take(MAX_SEGMENT_CLASSES)
        .collect();
    if !classes.is_empty() {
        return (format!("{tag}.{}", classes.join(".")), false);
    }

    for attr in SEMANTIC_ATTRIBUTES {
        if let Some(value) = element.attr(attr) {
            if is_quotable(value) {
                return (format!("{tag}[{attr}=\"{value}\"]"), false);
            }
        }
    }

    (format!("{tag}:nth-of-type({})", nth_of_type(node)), false)
}

fn nth_of_type(node: ElementRef<'_>) -> usize {
    let tag = node.value().name();
    node.prev_siblings()
        .filter_map(ElementRef::wrap)
        .filter(|sibling| sibling.value().name() == tag)
        .count()
        + 1
}

fn parent_element(node: ElementRef<'_>) -> Option<ElementRef<'_>> {
    node.parent().and_then(ElementRef::wrap)
}

/// Attribute values that can be quoted without escapes and never contain
/// the segment separator.
fn is_quotable(value: &str) -> bool {
    !value.trim().is_empty()
        && value.len() <= 64
        && !value
            .chars()
            .any(|c| matches!(c, '"' | '\\' | '>' | '\n' | '\r'))
}

fn join_segments(bottom_up: &[String]) -> String {
    bottom_up
        .iter()
        .rev()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(SEGMENT_SEPARATOR)
}
