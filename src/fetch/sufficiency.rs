//! Content-sufficiency heuristic.
//!
//! Decides whether a fetched body already carries the page content or is a
//! client-rendered shell that needs a browser.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use super::FetchResult;
use crate::models::SufficiencyConfig;

/// Empty SPA mount points.
static EMPTY_MOUNT_POINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<div\s+id\s*=\s*["'](?:root|app|__next|__nuxt|main-app)["']\s*>\s*</div>"#)
        .expect("mount point pattern is valid")
});

static SKELETON_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)class\s*=\s*["'][^"']*\b(?:skeleton|shimmer|placeholder-glow)\b"#)
        .expect("skeleton pattern is valid")
});

/// Verdict of the heuristic.
#[derive(Debug, Clone, PartialEq)]
pub enum Sufficiency {
    Sufficient,
    Empty,
    /// Length in grapheme clusters
    TooShort(usize),
    /// Matched placeholder signature
    Placeholder(String),
    /// Share of letters/digits among non-whitespace characters
    Noise(f64),
}

impl Sufficiency {
    pub fn is_sufficient(&self) -> bool {
        matches!(self, Self::Sufficient)
    }
}

impl fmt::Display for Sufficiency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sufficient => f.write_str("sufficient"),
            Self::Empty => f.write_str("empty content"),
            Self::TooShort(len) => write!(f, "content too short ({len} characters)"),
            Self::Placeholder(signature) => write!(f, "loading placeholder ({signature})"),
            Self::Noise(ratio) => write!(f, "mostly symbols (meaningful ratio {ratio:.2})"),
        }
    }
}

/// Whether a fetch result carries usable content.
pub fn is_content_sufficient(result: &FetchResult, config: &SufficiencyConfig) -> bool {
    result.success && check_content(&result.content, config).is_sufficient()
}

/// Judge a body against the configured thresholds.
pub fn check_content(content: &str, config: &SufficiencyConfig) -> Sufficiency {
    if content.trim().is_empty() {
        return Sufficiency::Empty;
    }

    let length = content.graphemes(true).count();
    if length < config.min_length {
        return Sufficiency::TooShort(length);
    }

    if let Some(signature) = placeholder_signature(content, config) {
        return Sufficiency::Placeholder(signature);
    }

    let ratio = meaningful_ratio(content);
    if ratio < config.min_meaningful_ratio {
        return Sufficiency::Noise(ratio);
    }

    Sufficiency::Sufficient
}

fn placeholder_signature(content: &str, config: &SufficiencyConfig) -> Option<String> {
    if let Some(found) = EMPTY_MOUNT_POINT.find(content) {
        return Some(found.as_str().to_string());
    }

    if let Some(phrase) = loading_element(content, &config.loading_phrases) {
        return Some(phrase);
    }

    SKELETON_CLASS
        .find(content)
        .map(|found| found.as_str().to_string())
}

/// First loading phrase that makes up the whole text of an element.
///
/// Only text runs between two tags count, so prose that mentions a phrase
/// in passing does not flag the page.
fn loading_element(content: &str, phrases: &[String]) -> Option<String> {
    let phrases: Vec<(String, &String)> = phrases
        .iter()
        .map(|phrase| (phrase.trim().to_lowercase(), phrase))
        .filter(|(lower, _)| !lower.is_empty())
        .collect();
    if phrases.is_empty() {
        return None;
    }

    content
        .split('<')
        .skip(1)
        .filter_map(|segment| segment.split_once('>').map(|(_, text)| text.trim()))
        .filter(|text| !text.is_empty())
        .find_map(|text| {
            let text = text.to_lowercase();
            phrases
                .iter()
                .find(|(lower, _)| *lower == text)
                .map(|(_, phrase)| (*phrase).clone())
        })
}

/// Share of alphanumeric characters among non-whitespace ones.
///
/// `char::is_alphanumeric` covers every script, so CJK text scores as
/// meaningful just like Latin text.
pub fn meaningful_ratio(content: &str) -> f64 {
    let mut total = 0usize;
    let mut meaningful = 0usize;
    for c in content.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if c.is_alphanumeric() {
            meaningful += 1;
        }
    }

    if total == 0 {
        0.0
    } else {
        meaningful as f64 / total as f64
    }
}
