//! Items handed to the downstream ingestion collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RenderType;

/// Processing state of an ingested item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    #[default]
    Pending,
    Processed,
    Failed,
}

/// A newly discovered URL from a subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentItem {
    pub url: String,

    /// Source subscription
    pub subscription_id: String,

    /// Inherited from the subscription so the item page is fetched the same way
    pub render_type: RenderType,

    pub status: ContentStatus,

    pub discovered_at: DateTime<Utc>,
}

impl ContentItem {
    /// Create a pending item.
    pub fn pending(
        url: impl Into<String>,
        subscription_id: impl Into<String>,
        render_type: RenderType,
    ) -> Self {
        Self {
            url: url.into(),
            subscription_id: subscription_id.into(),
            render_type,
            status: ContentStatus::Pending,
            discovered_at: Utc::now(),
        }
    }
}
