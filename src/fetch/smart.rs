// src/fetch/smart.rs

//! Render-type aware fetching.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::sufficiency::check_content;
use super::{BrowserPool, FetchErrorKind, FetchOptions, FetchResult, PageFetcher, elapsed_ms};
use crate::models::{RenderType, SufficiencyConfig};

/// Fetches through the shared browser pool.
pub struct RenderedFetcher {
    pool: Arc<BrowserPool>,
    timeout: Duration,
    settle: Duration,
}

impl RenderedFetcher {
    pub fn new(pool: Arc<BrowserPool>, timeout: Duration, settle: Duration) -> Self {
        Self {
            pool,
            timeout,
            settle,
        }
    }
}

#[async_trait]
impl PageFetcher for RenderedFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> FetchResult {
        let started = Instant::now();
        let timeout = options.timeout.unwrap_or(self.timeout);

        match self.pool.render(url, timeout, self.settle).await {
            Ok(html) => {
                log::debug!("Rendered {} ({} bytes)", url, html.len());
                let mut result = FetchResult::ok(html, RenderType::Dynamic, started);
                result.final_url = Some(url.to_string());
                result
            }
            Err(e) => {
                log::debug!("Rendering {} failed: {}", url, e);
                FetchResult::from_error(&e, RenderType::Dynamic, started)
            }
        }
    }
}

/// Chooses between static and rendered fetching.
///
/// | render type / flags   | behavior                                         |
/// |-----------------------|--------------------------------------------------|
/// | `force_browser`       | rendered only                                    |
/// | `Dynamic`             | rendered only                                    |
/// | `Static`              | static only                                      |
/// | `Unknown`             | static, escalating to rendered when insufficient |
///
/// A rendered result that is still insufficient becomes an
/// `ExtractionError`. When escalation fails but the static fetch got a body,
/// that body is returned tagged `Unknown` so the type is detected again on
/// the next fetch.
pub struct SmartFetcher {
    static_fetcher: Arc<dyn PageFetcher>,
    rendered: Option<Arc<dyn PageFetcher>>,
    sufficiency: SufficiencyConfig,
}

impl SmartFetcher {
    pub fn new(
        static_fetcher: Arc<dyn PageFetcher>,
        rendered: Option<Arc<dyn PageFetcher>>,
        sufficiency: SufficiencyConfig,
    ) -> Self {
        Self {
            static_fetcher,
            rendered,
            sufficiency,
        }
    }

    async fn fetch_rendered(
        &self,
        url: &str,
        options: &FetchOptions,
        started: Instant,
    ) -> FetchResult {
        let Some(rendered) = &self.rendered else {
            return FetchResult::failed(
                FetchErrorKind::Unknown,
                "headless rendering is disabled",
                RenderType::Dynamic,
                started,
            );
        };

        let mut result = rendered.fetch(url, options).await;
        if result.success {
            let verdict = check_content(&result.content, &self.sufficiency);
            if !verdict.is_sufficient() {
                log::debug!("Rendered content of {} insufficient: {}", url, verdict);
                result = FetchResult::failed(
                    FetchErrorKind::ExtractionError,
                    format!("rendered content is insufficient: {verdict}"),
                    RenderType::Dynamic,
                    started,
                );
            }
        }
        result.render_type = RenderType::Dynamic;
        result.duration_ms = elapsed_ms(started);
        result
    }
}

#[async_trait]
impl PageFetcher for SmartFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> FetchResult {
        let started = Instant::now();

        if options.force_browser || options.render_type == RenderType::Dynamic {
            return self.fetch_rendered(url, options, started).await;
        }

        let mut static_result = self.static_fetcher.fetch(url, options).await;
        static_result.render_type = RenderType::Static;
        if options.render_type == RenderType::Static {
            return static_result;
        }

        if static_result.success {
            let verdict = check_content(&static_result.content, &self.sufficiency);
            if verdict.is_sufficient() {
                log::debug!("Detected {} as static", url);
                return static_result;
            }
            log::debug!("Static content of {} insufficient: {}", url, verdict);
            static_result.render_type = RenderType::Unknown;
        } else if static_result.error_kind == Some(FetchErrorKind::NotFound) {
            return static_result;
        }

        if self.rendered.is_none() {
            return static_result;
        }

        log::info!("Escalating {} to headless rendering", url);
        let rendered = self.fetch_rendered(url, options, started).await;
        if rendered.success {
            log::debug!("Detected {} as dynamic", url);
            return rendered;
        }

        if static_result.success {
            log::warn!(
                "Rendering {} failed ({}); keeping static content",
                url,
                rendered.describe_error()
            );
            static_result.duration_ms = elapsed_ms(started);
            return static_result;
        }
        rendered
    }
}
