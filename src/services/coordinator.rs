//! Subscription check coordinator.
//!
//! A check fetches the page once, then tries the resolution strategies in
//! order against that document:
//!
//! 1. reverse lookup of the previously seen URLs,
//! 2. each cached stable selector, in rank order,
//! 3. the selector the user picked when the watch was created.
//!
//! The first strategy yielding at least one URL wins. When every strategy
//! fails the subscription is marked broken. A page that cannot be fetched
//! only records an error row; the next scheduled check retries.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use scraper::Selector;

use super::advisor::SelectorAdvisor;
use super::sampling::{RandomSource, ThreadRandom};
use crate::error::{AppError, Result};
use crate::extract::{ListDiffEngine, diff_urls};
use crate::fetch::FetchOptions;
use crate::models::{
    CheckConfig, CheckOutcome, ContentItem, ResolutionStrategy, Subscription,
    SubscriptionHistory, WatchOutcome, WatchRequest,
};
use crate::storage::{ContentSink, SubscriptionStore};
use crate::utils::url::{get_domain, normalize_absolute};

/// Container located by one of the strategies.
struct Resolution {
    strategy: ResolutionStrategy,
    urls: Vec<String>,
    container_selector: Option<String>,
    hierarchy: Option<String>,
    /// Selector that located the container, or its coarse form for lookups
    selector: String,
}

/// Runs watch creation and scheduled checks.
pub struct SubscriptionCheckCoordinator {
    engine: ListDiffEngine,
    store: Arc<dyn SubscriptionStore>,
    sink: Arc<dyn ContentSink>,
    advisor: Arc<dyn SelectorAdvisor>,
    random: Arc<dyn RandomSource>,
    config: CheckConfig,
}

impl SubscriptionCheckCoordinator {
    pub fn new(
        engine: ListDiffEngine,
        store: Arc<dyn SubscriptionStore>,
        sink: Arc<dyn ContentSink>,
        advisor: Arc<dyn SelectorAdvisor>,
        config: CheckConfig,
    ) -> Self {
        Self {
            engine,
            store,
            sink,
            advisor,
            random: Arc::new(ThreadRandom),
            config,
        }
    }

    /// Replace the source used for the refresh coin flip.
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Validate a picked selector and start watching it.
    ///
    /// Nothing is stored unless the selector yields at least one URL.
    pub async fn initialize_watch(&self, request: WatchRequest) -> Result<WatchOutcome> {
        let Some(url) = normalize_absolute(&request.url) else {
            return Ok(WatchOutcome::failure(format!("Invalid URL: {}", request.url)));
        };
        if let Err(e) = Selector::parse(&request.selector) {
            let error = AppError::selector(&request.selector, e);
            return Ok(WatchOutcome::failure(error.to_string()));
        }

        let result = self
            .engine
            .fetch(&url, &request.selector, &FetchOptions::default())
            .await;
        if !result.success {
            let error = result.error.unwrap_or_else(|| "extraction failed".into());
            log::warn!("Watch on {} rejected: {}", url, error);
            return Ok(WatchOutcome::failure(error));
        }

        let name = match request.name.trim() {
            "" => get_domain(&url).unwrap_or_else(|| url.clone()),
            name => name.to_string(),
        };
        let interval = request
            .check_interval_mins
            .unwrap_or(self.config.default_interval_mins);

        let mut subscription = Subscription::new(
            &url,
            name,
            &request.selector,
            result.detected_render_type,
            interval,
        );
        subscription.mark_checked(Utc::now());
        self.store.insert_subscription(&subscription).await?;

        let seed = SubscriptionHistory::success(
            &subscription.id,
            result.urls.clone(),
            Vec::new(),
            result.selector_hierarchy,
            result.container_selector,
            ResolutionStrategy::InitialSelector,
            false,
        );
        self.store.append_history(&seed).await?;

        log::info!(
            "Watching {} as {} ({} URLs, {} page)",
            url,
            subscription.id,
            result.urls.len(),
            subscription.render_type
        );
        Ok(WatchOutcome {
            success: true,
            subscription_id: Some(subscription.id),
            url_count: result.urls.len(),
            error: None,
        })
    }

    /// Run one check of subscription `id`.
    ///
    /// Store and sink failures are returned as errors; everything else is
    /// reported in the outcome.
    pub async fn check_subscription(&self, id: &str) -> Result<CheckOutcome> {
        let Some(mut subscription) = self.store.get_subscription(id).await? else {
            return Ok(CheckOutcome::failure(format!("Subscription not found: {id}")));
        };
        if !subscription.is_active() {
            return Ok(CheckOutcome::failure(format!(
                "Subscription {id} is {}",
                subscription.status
            )));
        }

        let previous = self.store.latest_history(id).await?;
        let (previous_urls, cached_selectors) = previous
            .as_ref()
            .map(|row| (row.urls.clone(), row.stable_selectors.clone()))
            .unwrap_or_default();

        let options = FetchOptions::with_render_type(subscription.render_type);
        let page = self.engine.fetch_page(&subscription.url, &options).await;
        let checked_at = Utc::now();

        if !page.success {
            let error = page.describe_error();
            log::warn!("Check of {} could not fetch {}: {}", id, subscription.url, error);
            let row = SubscriptionHistory::failure(id, previous.as_ref(), &error);
            self.store.append_history(&row).await?;
            subscription.mark_checked(checked_at);
            self.store.update_subscription(&subscription).await?;
            return Ok(CheckOutcome::failure(error));
        }

        let resolution = match self.resolve(
            &subscription,
            &page.content,
            &previous_urls,
            &cached_selectors,
        ) {
            Ok(resolution) => resolution,
            Err(details) => {
                let error = format!("All resolution strategies failed ({details})");
                log::warn!("Subscription {} is broken: {}", id, error);
                subscription.mark_broken(&error);
                subscription.mark_checked(checked_at);
                let row = SubscriptionHistory::failure(id, previous.as_ref(), &error);
                self.store.append_history(&row).await?;
                self.store.update_subscription(&subscription).await?;
                return Ok(CheckOutcome {
                    broken: true,
                    ..CheckOutcome::failure(error)
                });
            }
        };

        if !subscription.render_type.is_known() && page.render_type.is_known() {
            log::debug!("Caching render type {} for {}", page.render_type, id);
            subscription.render_type = page.render_type;
        }

        let new_urls = diff_urls(&previous_urls, &resolution.urls);
        for url in &new_urls {
            let item = ContentItem::pending(url, id, subscription.render_type);
            self.sink.ingest(&item).await?;
        }

        let stable_selectors = self.refresh_stable_selectors(&resolution, cached_selectors).await;

        let row = SubscriptionHistory::success(
            id,
            resolution.urls.clone(),
            stable_selectors,
            resolution.hierarchy,
            resolution.container_selector,
            resolution.strategy,
            !new_urls.is_empty(),
        );
        self.store.append_history(&row).await?;

        subscription.mark_checked(checked_at);
        self.store.update_subscription(&subscription).await?;

        log::info!(
            "Checked {} via {}: {} new of {} URLs",
            id,
            resolution.strategy,
            new_urls.len(),
            resolution.urls.len()
        );
        Ok(CheckOutcome {
            success: true,
            total_urls: resolution.urls.len(),
            new_urls,
            error: None,
            broken: false,
            resolved_by: Some(resolution.strategy),
        })
    }

    /// Stop scheduled checks. Returns false when the subscription is not active.
    pub async fn pause(&self, id: &str) -> Result<bool> {
        self.set_paused(id, true).await
    }

    /// Resume a paused subscription. Broken subscriptions stay broken.
    pub async fn resume(&self, id: &str) -> Result<bool> {
        self.set_paused(id, false).await
    }

    async fn set_paused(&self, id: &str, paused: bool) -> Result<bool> {
        let mut subscription = self
            .store
            .get_subscription(id)
            .await?
            .ok_or_else(|| AppError::validation(format!("Subscription not found: {id}")))?;

        if !subscription.set_paused(paused) {
            return Ok(false);
        }
        self.store.update_subscription(&subscription).await?;
        log::info!("Subscription {} is now {}", id, subscription.status);
        Ok(true)
    }

    /// Try the strategies in order against one fetched document.
    fn resolve(
        &self,
        subscription: &Subscription,
        html: &str,
        previous_urls: &[String],
        stable_selectors: &[String],
    ) -> std::result::Result<Resolution, String> {
        let mut failures = Vec::new();

        if !previous_urls.is_empty() {
            let lookup = self
                .engine
                .lookup_in_html(html, &subscription.url, previous_urls);
            if lookup.found && !lookup.urls.is_empty() {
                log::debug!(
                    "Reverse lookup matched {} of {} known URLs",
                    lookup.found_urls.len(),
                    previous_urls.len()
                );
                let selector = lookup.container_selector.clone().unwrap_or_default();
                return Ok(Resolution {
                    strategy: ResolutionStrategy::ReverseLookup,
                    urls: lookup.urls,
                    container_selector: lookup.container_selector,
                    hierarchy: lookup.selector_hierarchy,
                    selector,
                });
            }
            failures.push("reverse lookup: no known URL on the page".to_string());
        }

        let mut tried = HashSet::new();
        let candidates = stable_selectors
            .iter()
            .map(|s| (ResolutionStrategy::StableSelector, s))
            .chain(std::iter::once((
                ResolutionStrategy::InitialSelector,
                &subscription.initial_selector,
            )));

        for (strategy, selector) in candidates {
            if !tried.insert(selector.as_str()) {
                continue;
            }
            let result = self.engine.extract_list(html, &subscription.url, selector);
            if result.success {
                return Ok(Resolution {
                    strategy,
                    urls: result.urls,
                    container_selector: result.container_selector,
                    hierarchy: result.selector_hierarchy,
                    selector: selector.clone(),
                });
            }
            log::debug!("{} '{}' failed: {:?}", strategy, selector, result.error);
            failures.push(format!(
                "{selector}: {}",
                result.error.unwrap_or_else(|| "no URLs".into())
            ));
        }

        Err(failures.join("; "))
    }

    /// Ask the advisor for fresh stable selectors when due.
    ///
    /// Due on every check while nothing is cached, otherwise with
    /// `refresh_probability`. The cache is only replaced by a non-empty,
    /// parseable candidate list.
    async fn refresh_stable_selectors(
        &self,
        resolution: &Resolution,
        cached: Vec<String>,
    ) -> Vec<String> {
        let due = cached.is_empty() || self.random.sample() < self.config.refresh_probability;
        if !due {
            return cached;
        }
        let Some(hierarchy) = resolution.hierarchy.as_deref() else {
            return cached;
        };

        let mut candidates = match self
            .advisor
            .extract_stable_selectors(hierarchy, &resolution.selector)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                log::warn!(
                    "Selector advisor failed, keeping {} cached selectors: {}",
                    cached.len(),
                    e
                );
                return cached;
            }
        };

        if candidates.is_empty() {
            match self.advisor.find_lca(hierarchy, &resolution.urls).await {
                Ok(Some(selector)) => candidates.push(selector),
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Selector advisor LCA failed, keeping cache: {}", e);
                    return cached;
                }
            }
        }

        let sanitized = sanitize_selectors(candidates, self.config.max_stable_selectors);
        if sanitized.is_empty() {
            log::debug!("No usable selector suggestions; keeping cache");
            cached
        } else {
            log::debug!("Refreshed stable selectors: {:?}", sanitized);
            sanitized
        }
    }
}

/// Parseable, distinct selectors, at most `max` of them.
fn sanitize_selectors(candidates: Vec<String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && Selector::parse(s).is_ok())
        .filter(|s| seen.insert(s.clone()))
        .take(max)
        .collect()
}
