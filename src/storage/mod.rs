//! Persistence and ingestion collaborators.
//!
//! The coordinator only needs filter-by-id/status and order-by-time, so
//! any engine can sit behind `SubscriptionStore`. `LocalStorage` keeps
//! everything as JSON files:
//!
//! ```text
//! {root}/
//! ├── subscriptions.json      # All subscriptions
//! ├── history/
//! │   └── {subscription}.json # Append-only check rows
//! └── content/
//!     └── pending.json        # Items handed to ingestion
//! ```

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ContentItem, Subscription, SubscriptionHistory, SubscriptionStatus};

pub use local::LocalStorage;

/// Subscription and history persistence.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Store a new subscription. Fails if the id already exists.
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()>;

    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>>;

    /// Replace a stored subscription. Fails if it does not exist.
    async fn update_subscription(&self, subscription: &Subscription) -> Result<()>;

    /// All subscriptions, optionally filtered by status, oldest first.
    async fn list_subscriptions(
        &self,
        status: Option<SubscriptionStatus>,
    ) -> Result<Vec<Subscription>>;

    async fn append_history(&self, row: &SubscriptionHistory) -> Result<()>;

    /// Row with the greatest `checked_at`.
    async fn latest_history(&self, subscription_id: &str) -> Result<Option<SubscriptionHistory>>;

    /// Newest rows first.
    async fn list_history(
        &self,
        subscription_id: &str,
        limit: usize,
    ) -> Result<Vec<SubscriptionHistory>>;
}

/// Downstream ingestion of discovered URLs.
#[async_trait]
pub trait ContentSink: Send + Sync {
    async fn ingest(&self, item: &ContentItem) -> Result<()>;
}
