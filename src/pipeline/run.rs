// src/pipeline/run.rs

//! Scheduled check run.

use std::collections::HashSet;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::error::Result;
use crate::models::{CheckConfig, SubscriptionStatus};
use crate::services::SubscriptionCheckCoordinator;
use crate::storage::SubscriptionStore;

/// Counters for one scheduled run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    /// Active subscriptions whose interval had elapsed
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Subscriptions moved to `broken` by this run
    pub broken: usize,
    pub new_urls: usize,
    /// Checks that could not record their outcome
    pub errors: usize,
}

/// Check every due, active subscription once.
///
/// Up to `config.max_concurrent` checks run at a time. A storage error in
/// one check is logged and counted without stopping the others.
pub async fn run_due_checks(
    coordinator: &SubscriptionCheckCoordinator,
    store: &dyn SubscriptionStore,
    config: &CheckConfig,
) -> Result<RunSummary> {
    let now = Utc::now();
    let active = store
        .list_subscriptions(Some(SubscriptionStatus::Active))
        .await?;

    let mut seen = HashSet::new();
    let due: Vec<String> = active
        .into_iter()
        .filter(|s| s.is_due(now))
        .map(|s| s.id)
        .filter(|id| seen.insert(id.clone()))
        .collect();

    let mut summary = RunSummary {
        due: due.len(),
        ..RunSummary::default()
    };
    log::info!("{} subscriptions due for a check", summary.due);

    let mut checks = stream::iter(due)
        .map(|id| async move {
            let outcome = coordinator.check_subscription(&id).await;
            (id, outcome)
        })
        .buffer_unordered(config.max_concurrent.max(1));

    while let Some((id, outcome)) = checks.next().await {
        match outcome {
            Ok(outcome) if outcome.success => {
                summary.succeeded += 1;
                summary.new_urls += outcome.new_urls.len();
            }
            Ok(outcome) => {
                summary.failed += 1;
                if outcome.broken {
                    summary.broken += 1;
                }
                log::warn!(
                    "Check of {} failed: {}",
                    id,
                    outcome.error.unwrap_or_default()
                );
            }
            Err(e) => {
                summary.errors += 1;
                log::error!("Check of {} aborted: {}", id, e);
            }
        }
    }

    log::info!(
        "Run complete: {} ok, {} failed ({} broken), {} errors, {} new URLs",
        summary.succeeded,
        summary.failed,
        summary.broken,
        summary.errors,
        summary.new_urls
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use tempfile::TempDir;

    use super::*;
    use crate::extract::ListDiffEngine;
    use crate::fetch::FixtureFetcher;
    use crate::models::{ExtractConfig, RenderType, Subscription};
    use crate::services::NoopAdvisor;
    use crate::storage::LocalStorage;

    fn page(ids: &[u32]) -> String {
        let items: String = ids
            .iter()
            .map(|id| format!("<li><a href=\"/n/{id}\">News {id}</a></li>"))
            .collect();
        format!("<html><body><ul class=\"news\">{items}</ul></body></html>")
    }

    #[tokio::test]
    async fn test_run_checks_only_due_active_subscriptions() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()));
        let fetcher = Arc::new(FixtureFetcher::new());

        let mut due = Subscription::new("https://a.example/", "A", "ul.news", RenderType::Static, 60);
        due.mark_checked(Utc::now() - Duration::minutes(90));
        let mut fresh = Subscription::new("https://b.example/", "B", "ul.news", RenderType::Static, 60);
        fresh.mark_checked(Utc::now());
        let mut paused = Subscription::new("https://c.example/", "C", "ul.news", RenderType::Static, 60);
        paused.set_paused(true);
        let missing = Subscription::new("https://d.example/", "D", "ul.gone", RenderType::Static, 60);

        for sub in [&due, &fresh, &paused, &missing] {
            storage.insert_subscription(sub).await.unwrap();
            fetcher.set_page(&sub.url, &page(&[2, 1]));
        }

        let engine = ListDiffEngine::new(fetcher.clone(), ExtractConfig::default());
        let coordinator = SubscriptionCheckCoordinator::new(
            engine,
            storage.clone(),
            storage.clone(),
            Arc::new(NoopAdvisor),
            CheckConfig::default(),
        );

        let summary = run_due_checks(&coordinator, storage.as_ref(), &CheckConfig::default())
            .await
            .unwrap();
        assert_eq!(summary.due, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.broken, 1);
        assert_eq!(summary.new_urls, 2);
        assert_eq!(fetcher.fetch_count(), 2);

        let broken = storage.get_subscription(&missing.id).await.unwrap().unwrap();
        assert_eq!(broken.status, SubscriptionStatus::Broken);

        // everything just checked; nothing is due again
        let again = run_due_checks(&coordinator, storage.as_ref(), &CheckConfig::default())
            .await
            .unwrap();
        assert_eq!(again.due, 0);
    }
}
