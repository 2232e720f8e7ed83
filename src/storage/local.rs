//! Local filesystem storage implementation.
//!
//! Every write goes to a temporary file that is then renamed over the
//! target, so a crash never leaves a half-written document. A single async
//! mutex serializes read-modify-write cycles within the process.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{ContentItem, Subscription, SubscriptionHistory, SubscriptionStatus};
use crate::storage::{ContentSink, SubscriptionStore};

const SUBSCRIPTIONS_KEY: &str = "subscriptions.json";
const PENDING_CONTENT_KEY: &str = "content/pending.json";

/// JSON-file storage backend.
pub struct LocalStorage {
    root_dir: PathBuf,
    lock: Mutex<()>,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Items handed to ingestion so far.
    pub async fn pending_content(&self) -> Result<Vec<ContentItem>> {
        Ok(self.read_json(PENDING_CONTENT_KEY).await?.unwrap_or_default())
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    fn history_key(subscription_id: &str) -> Result<String> {
        let safe = !subscription_id.is_empty()
            && subscription_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(AppError::storage(format!(
                "invalid subscription id: {subscription_id:?}"
            )));
        }
        Ok(format!("history/{subscription_id}.json"))
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read JSON data, `None` if the file doesn't exist.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn load_subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self.read_json(SUBSCRIPTIONS_KEY).await?.unwrap_or_default())
    }

    async fn load_history(&self, subscription_id: &str) -> Result<Vec<SubscriptionHistory>> {
        let key = Self::history_key(subscription_id)?;
        Ok(self.read_json(&key).await?.unwrap_or_default())
    }
}

#[async_trait]
impl SubscriptionStore for LocalStorage {
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut all = self.load_subscriptions().await?;
        if all.iter().any(|s| s.id == subscription.id) {
            return Err(AppError::storage(format!(
                "subscription {} already exists",
                subscription.id
            )));
        }
        all.push(subscription.clone());
        self.write_json(SUBSCRIPTIONS_KEY, &all).await
    }

    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load_subscriptions()
            .await?
            .into_iter()
            .find(|s| s.id == id))
    }

    async fn update_subscription(&self, subscription: &Subscription) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut all = self.load_subscriptions().await?;
        let Some(slot) = all.iter_mut().find(|s| s.id == subscription.id) else {
            return Err(AppError::storage(format!(
                "subscription {} not found",
                subscription.id
            )));
        };
        *slot = subscription.clone();
        self.write_json(SUBSCRIPTIONS_KEY, &all).await
    }

    async fn list_subscriptions(
        &self,
        status: Option<SubscriptionStatus>,
    ) -> Result<Vec<Subscription>> {
        let _guard = self.lock.lock().await;
        let mut all = self.load_subscriptions().await?;
        if let Some(status) = status {
            all.retain(|s| s.status == status);
        }
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn append_history(&self, row: &SubscriptionHistory) -> Result<()> {
        let _guard = self.lock.lock().await;
        let key = Self::history_key(&row.subscription_id)?;
        let mut rows = self.load_history(&row.subscription_id).await?;
        rows.push(row.clone());
        self.write_json(&key, &rows).await
    }

    async fn latest_history(&self, subscription_id: &str) -> Result<Option<SubscriptionHistory>> {
        let _guard = self.lock.lock().await;
        let rows = self.load_history(subscription_id).await?;
        // later appends win ties
        Ok(rows
            .into_iter()
            .enumerate()
            .max_by_key(|(i, row)| (row.checked_at, *i))
            .map(|(_, row)| row))
    }

    async fn list_history(
        &self,
        subscription_id: &str,
        limit: usize,
    ) -> Result<Vec<SubscriptionHistory>> {
        let _guard = self.lock.lock().await;
        let mut rows: Vec<(usize, SubscriptionHistory)> = self
            .load_history(subscription_id)
            .await?
            .into_iter()
            .enumerate()
            .collect();
        rows.sort_by(|(ia, a), (ib, b)| (b.checked_at, ib).cmp(&(a.checked_at, ia)));
        Ok(rows.into_iter().take(limit).map(|(_, row)| row).collect())
    }
}

#[async_trait]
impl ContentSink for LocalStorage {
    async fn ingest(&self, item: &ContentItem) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut pending: Vec<ContentItem> = self
            .read_json(PENDING_CONTENT_KEY)
            .await?
            .unwrap_or_default();
        if pending
            .iter()
            .any(|p| p.url == item.url && p.subscription_id == item.subscription_id)
        {
            log::debug!("Content {} already queued", item.url);
            return Ok(());
        }
        pending.push(item.clone());
        self.write_json(PENDING_CONTENT_KEY, &pending).await
    }
}
