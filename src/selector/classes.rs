//! Classification of class and id tokens.
//!
//! Build tools (styled-components, emotion, styled-jsx, CSS modules) emit
//! hashed names that change on every deploy. Selectors and hierarchy
//! snapshots only use tokens that survive those redeploys.

use std::sync::LazyLock;

use regex::RegexSet;

static DYNAMIC_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        // styled-components
        r"^sc-[A-Za-z0-9]",
        // emotion
        r"^css-[A-Za-z0-9]",
        // styled-jsx
        r"^jsx-\d+$",
        // underscore-prefixed hashes
        r"^_[A-Za-z0-9_-]{4,}$",
        // short prefix followed by a long run of digits
        r"^[A-Za-z]{1,3}-?\d{4,}$",
    ])
    .expect("dynamic class patterns are valid")
});

/// Whether a token looks generated rather than authored.
pub fn is_dynamic_token(token: &str) -> bool {
    DYNAMIC_PATTERNS.is_match(token) || has_module_hash_suffix(token) || looks_like_hash(token)
}

/// Whether a token can appear in a selector without CSS escaping.
pub fn is_selector_safe(token: &str) -> bool {
    let body = token.strip_prefix('-').unwrap_or(token);
    let mut chars = body.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// A token usable in a long-lived selector.
pub fn is_stable_token(token: &str) -> bool {
    is_selector_safe(token) && !is_dynamic_token(token)
}

/// Stable class names of an element, in attribute order.
pub fn stable_classes<'a>(classes: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    classes.filter(|c| is_stable_token(c)).collect()
}

/// CSS-module names such as `Card_title__a1B2c`.
fn has_module_hash_suffix(token: &str) -> bool {
    token.rsplit_once("__").is_some_and(|(_, suffix)| {
        (5..=8).contains(&suffix.len())
            && suffix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            && suffix.chars().any(|c| c.is_ascii_digit())
    })
}

/// Long letter/digit soups like `a1b2c3d4` or `x7Fk2pQ9`.
fn looks_like_hash(token: &str) -> bool {
    if token.len() < 8 || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }

    let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < 2 || digits == token.len() {
        return false;
    }

    let transitions = token
        .as_bytes()
        .windows(2)
        .filter(|pair| pair[0].is_ascii_digit() != pair[1].is_ascii_digit())
        .count();
    transitions >= 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_in_js_hashes_are_dynamic() {
        for token in [
            "sc-bdVaJa",
            "css-1x2y3z",
            "jsx-2938475",
            "_3xKq9",
            "e1234567",
            "x-20394",
            "Card_title__a1B2c",
            "a1b2c3d4",
        ] {
            assert!(is_dynamic_token(token), "{token} should be dynamic");
        }
    }

    #[test]
    fn test_semantic_names_are_stable() {
        for token in [
            "post-list",
            "posts",
            "article-item",
            "block__element",
            "article2024",
            "h2",
            "nav_main",
        ] {
            assert!(is_stable_token(token), "{token} should be stable");
        }
    }

    #[test]
    fn test_tokens_needing_escapes_are_unsafe() {
        assert!(!is_selector_safe("md:flex"));
        assert!(!is_selector_safe("w-1/2"));
        assert!(!is_selector_safe("2col"));
        assert!(!is_selector_safe(""));
        assert!(is_selector_safe("-webkit-box"));
    }

    #[test]
    fn test_stable_classes_preserves_order() {
        let classes = ["post-list", "css-abc123", "featured", "md:grid"];
        assert_eq!(
            stable_classes(classes.into_iter()),
            vec!["post-list", "featured"]
        );
    }
}
