// src/fetch/fixture.rs

//! In-memory fetcher for offline runs and tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Instant;

use async_trait::async_trait;

use super::{FetchErrorKind, FetchOptions, FetchResult, PageFetcher};
use crate::error::Result;
use crate::models::RenderType;

#[derive(Debug, Clone)]
enum Fixture {
    Page(String),
    Failure(FetchErrorKind),
}

/// Serves registered HTML by URL.
///
/// Pages can be replaced between fetches to simulate a site changing.
/// Unregistered URLs fail with `NotFound`.
#[derive(Debug)]
pub struct FixtureFetcher {
    fixtures: RwLock<HashMap<String, Fixture>>,
    render_type: RenderType,
    fetches: AtomicUsize,
}

impl Default for FixtureFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self {
            fixtures: RwLock::new(HashMap::new()),
            render_type: RenderType::Static,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Tag served pages with `render_type` instead of `Static`.
    pub fn rendering_as(mut self, render_type: RenderType) -> Self {
        self.render_type = render_type;
        self
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.set_page(url, html);
        self
    }

    /// Serve the HTML file at `path` for `url`.
    pub fn from_file(url: &str, path: impl AsRef<Path>) -> Result<Self> {
        let html = std::fs::read_to_string(path)?;
        Ok(Self::new().with_page(url, &html))
    }

    pub fn set_page(&self, url: &str, html: &str) {
        self.write()
            .insert(url.to_string(), Fixture::Page(html.to_string()));
    }

    /// Make fetches of `url` fail with `kind`.
    pub fn set_failure(&self, url: &str, kind: FetchErrorKind) {
        self.write().insert(url.to_string(), Fixture::Failure(kind));
    }

    pub fn remove(&self, url: &str) {
        self.write().remove(url);
    }

    /// Fetches served so far, failures included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Fixture>> {
        self.fixtures.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> FetchResult {
        let started = Instant::now();
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let render_type = if options.force_browser {
            RenderType::Dynamic
        } else if options.render_type.is_known() {
            options.render_type
        } else {
            self.render_type
        };

        let fixture = self
            .fixtures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned();

        match fixture {
            Some(Fixture::Page(html)) => {
                let mut result = FetchResult::ok(html, render_type, started);
                result.status = Some(200);
                result.final_url = Some(url.to_string());
                result
            }
            Some(Fixture::Failure(kind)) => FetchResult::failed(
                kind,
                format!("simulated failure for {url}"),
                render_type,
                started,
            ),
            None => FetchResult::failed(
                FetchErrorKind::NotFound,
                format!("no fixture for {url}"),
                render_type,
                started,
            ),
        }
    }
}
