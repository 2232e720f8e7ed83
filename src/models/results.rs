// src/models/results.rs

//! Transient results returned by the engine and the coordinator.

use serde::{Deserialize, Serialize};

use crate::fetch::FetchErrorKind;

use super::{RenderType, ResolutionStrategy};

/// Outcome of extracting the link list under a selector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListDiffResult {
    pub success: bool,

    /// Absolute, de-duplicated URLs in document order
    pub urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_selector: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_hierarchy: Option<String>,

    pub detected_render_type: RenderType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Set when the page itself could not be fetched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FetchErrorKind>,

    pub duration_ms: u64,
}

impl ListDiffResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Outcome of relocating previously seen URLs on a page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrlLookupResult {
    pub found: bool,

    /// Known URLs that were located on the page
    pub found_urls: Vec<String>,

    /// URLs extracted from the resolved container
    pub urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_selector: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_hierarchy: Option<String>,

    pub detected_render_type: RenderType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FetchErrorKind>,

    pub duration_ms: u64,
}

impl UrlLookupResult {
    pub fn not_found() -> Self {
        Self::default()
    }
}

/// Request to start watching a page region.
#[derive(Debug, Clone)]
pub struct WatchRequest {
    pub url: String,
    pub selector: String,
    pub name: String,
    pub check_interval_mins: Option<u32>,
}

/// Result of `initialize_watch`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WatchOutcome {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,

    pub url_count: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WatchOutcome {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Result of `check_subscription`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckOutcome {
    pub success: bool,
    pub new_urls: Vec<String>,
    pub total_urls: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// True when this check moved the subscription to `broken`
    pub broken: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<ResolutionStrategy>,
}

impl CheckOutcome {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}
