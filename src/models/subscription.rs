// src/models/subscription.rs

//! Watched page subscriptions.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::short_hash;

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Paused,
    Broken,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Broken => "broken",
        };
        f.write_str(s)
    }
}

/// Whether a page needs a headless browser to show its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenderType {
    Static,
    Dynamic,
    #[default]
    Unknown,
}

impl RenderType {
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for RenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A watched list region on a page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    /// Stable identifier derived from url, selector and creation time
    pub id: String,

    /// Page being watched
    pub url: String,

    /// Display name
    pub name: String,

    pub status: SubscriptionStatus,

    /// Minutes between scheduled checks
    pub check_interval_mins: u32,

    /// Selector picked by the user when the watch was created
    pub initial_selector: String,

    /// Detected once, then reused so checks do not pay for detection again
    #[serde(default)]
    pub render_type: RenderType,

    /// Set iff the subscription is broken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Create an active subscription.
    pub fn new(
        url: impl Into<String>,
        name: impl Into<String>,
        initial_selector: impl Into<String>,
        render_type: RenderType,
        check_interval_mins: u32,
    ) -> Self {
        let url = url.into();
        let initial_selector = initial_selector.into();
        let now = Utc::now();
        let id = short_hash(&[&url, &initial_selector, &now.to_rfc3339()]);

        Self {
            id,
            url,
            name: name.into(),
            status: SubscriptionStatus::Active,
            check_interval_mins,
            initial_selector,
            render_type,
            error_message: None,
            last_checked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    /// Whether the next scheduled check is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_checked_at {
            Some(last) => now - last >= Duration::minutes(i64::from(self.check_interval_mins)),
            None => true,
        }
    }

    /// Move to `broken`, recording why.
    pub fn mark_broken(&mut self, message: impl Into<String>) {
        self.status = SubscriptionStatus::Broken;
        self.error_message = Some(message.into());
        self.updated_at = Utc::now();
    }

    /// Record a finished check.
    pub fn mark_checked(&mut self, at: DateTime<Utc>) {
        self.last_checked_at = Some(at);
        self.updated_at = at;
    }

    /// Change between `active` and `paused`. Broken subscriptions stay broken.
    pub fn set_paused(&mut self, paused: bool) -> bool {
        let next = match (self.status, paused) {
            (SubscriptionStatus::Active, true) => SubscriptionStatus::Paused,
            (SubscriptionStatus::Paused, false) => SubscriptionStatus::Active,
            _ => return false,
        };
        self.status = next;
        self.updated_at = Utc::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Subscription {
        Subscription::new(
            "https://example.com/posts",
            "Example",
            "section.posts",
            RenderType::Static,
            60,
        )
    }

    #[test]
    fn test_new_is_active_without_error() {
        let sub = sample();
        assert!(sub.is_active());
        assert!(sub.error_message.is_none());
        assert_eq!(sub.id.len(), 16);
    }

    #[test]
    fn test_is_due() {
        let mut sub = sample();
        let now = Utc::now();
        assert!(sub.is_due(now));

        sub.mark_checked(now - Duration::minutes(30));
        assert!(!sub.is_due(now));

        sub.mark_checked(now - Duration::minutes(61));
        assert!(sub.is_due(now));
    }

    #[test]
    fn test_mark_broken_sets_message() {
        let mut sub = sample();
        sub.mark_broken("all strategies failed");
        assert_eq!(sub.status, SubscriptionStatus::Broken);
        assert_eq!(sub.error_message.as_deref(), Some("all strategies failed"));
    }

    #[test]
    fn test_broken_cannot_be_resumed() {
        let mut sub = sample();
        assert!(sub.set_paused(true));
        assert_eq!(sub.status, SubscriptionStatus::Paused);
        assert!(sub.set_paused(false));
        assert!(sub.is_active());

        sub.mark_broken("gone");
        assert!(!sub.set_paused(false));
        assert_eq!(sub.status, SubscriptionStatus::Broken);
    }

    #[test]
    fn test_render_type_serialization() {
        let json = serde_json::to_string(&RenderType::Dynamic).unwrap();
        assert_eq!(json, "\"dynamic\"");
        let parsed: SubscriptionStatus = serde_json::from_str("\"broken\"").unwrap();
        assert_eq!(parsed, SubscriptionStatus::Broken);
    }
}
