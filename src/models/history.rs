// src/models/history.rs

//! Append-only check history.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::short_hash;

/// Which resolution strategy located the container on a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    ReverseLookup,
    StableSelector,
    InitialSelector,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ReverseLookup => "reverse lookup",
            Self::StableSelector => "stable selector",
            Self::InitialSelector => "initial selector",
        };
        f.write_str(s)
    }
}

/// One row per check attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionHistory {
    pub id: String,
    pub subscription_id: String,

    /// Container URLs, newest first
    pub urls: Vec<String>,

    /// Ranked candidate selectors for the container
    #[serde(default)]
    pub stable_selectors: Vec<String>,

    /// Bounded serialized snapshot of the container subtree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_hierarchy: Option<String>,

    /// Coarse selector of the container found on this check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_selector: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<ResolutionStrategy>,

    pub has_changed: bool,

    /// Present iff the check failed to locate any container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub checked_at: DateTime<Utc>,
}

impl SubscriptionHistory {
    /// Row for a check that located the container.
    pub fn success(
        subscription_id: impl Into<String>,
        urls: Vec<String>,
        stable_selectors: Vec<String>,
        selector_hierarchy: Option<String>,
        container_selector: Option<String>,
        resolved_by: ResolutionStrategy,
        has_changed: bool,
    ) -> Self {
        let subscription_id = subscription_id.into();
        let checked_at = Utc::now();
        Self {
            id: Self::make_id(&subscription_id, checked_at),
            subscription_id,
            urls,
            stable_selectors,
            selector_hierarchy,
            container_selector,
            resolved_by: Some(resolved_by),
            has_changed,
            error: None,
            checked_at,
        }
    }

    /// Row for a failed check.
    ///
    /// The previous row's URLs and selectors are carried forward so the
    /// latest row remains a usable baseline for the next check.
    pub fn failure(
        subscription_id: impl Into<String>,
        previous: Option<&SubscriptionHistory>,
        error: impl Into<String>,
    ) -> Self {
        let subscription_id = subscription_id.into();
        let checked_at = Utc::now();
        Self {
            id: Self::make_id(&subscription_id, checked_at),
            subscription_id,
            urls: previous.map(|p| p.urls.clone()).unwrap_or_default(),
            stable_selectors: previous
                .map(|p| p.stable_selectors.clone())
                .unwrap_or_default(),
            selector_hierarchy: previous.and_then(|p| p.selector_hierarchy.clone()),
            container_selector: None,
            resolved_by: None,
            has_changed: false,
            error: Some(error.into()),
            checked_at,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn make_id(subscription_id: &str, checked_at: DateTime<Utc>) -> String {
        let nanos = checked_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| checked_at.timestamp_micros() * 1000);
        short_hash(&[subscription_id, &nanos.to_string()])
    }
}
