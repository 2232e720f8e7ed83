// src/fetch/pool.rs

//! Bounded pool of headless browsers.
//!
//! The pool caps the number of live browser processes and the number of
//! pages open on each one. Browsers are recycled after serving a configured
//! number of pages or living past a configured lifetime: a retired browser
//! takes no new pages and is closed once its open pages are released.
//! Retired browsers still count toward the cap until they are closed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, Semaphore};

use super::FetchErrorKind;
use crate::error::{AppError, Result};
use crate::models::PoolConfig;

/// Starts browser processes.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserHandle>>;
}

/// A running browser.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Open a blank tab.
    ///
    /// The pool drops this future at the render deadline, so a tab that
    /// finishes opening after cancellation must be closed by the handle.
    async fn open_page(&self) -> Result<Box<dyn BrowserPage>>;
    async fn close(&self) -> Result<()>;
}

/// A single tab.
#[async_trait]
pub trait BrowserPage: Send {
    /// Navigate to `url`, wait `settle` for client rendering, return the DOM.
    async fn render(&mut self, url: &str, settle: Duration) -> Result<String>;
    async fn close(&mut self) -> Result<()>;
}

/// Pool lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Created,
    Running,
    ShutDown,
}

/// Counters for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub live_browsers: usize,
    pub browsers_launched: usize,
    pub browsers_closed: usize,
    pub pages_opened: usize,
    pub pages_closed: usize,
}

struct PooledBrowser {
    id: usize,
    handle: Box<dyn BrowserHandle>,
    pages: Arc<Semaphore>,
    served: AtomicUsize,
    launched_at: Instant,
    retired: AtomicBool,
}

/// Non-retired browser with the most free page slots.
fn least_loaded(browsers: &[Arc<PooledBrowser>]) -> Option<Arc<PooledBrowser>> {
    browsers
        .iter()
        .filter(|b| !b.is_retired() && b.pages.available_permits() > 0)
        .max_by_key(|b| b.pages.available_permits())
        .cloned()
}

impl PooledBrowser {
    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    fn is_idle(&self, page_slots: usize) -> bool {
        self.pages.available_permits() == page_slots
    }

    fn retire_if_spent(&self, config: &PoolConfig) {
        if self.served.load(Ordering::Acquire) >= config.max_pages_per_browser
            || self.launched_at.elapsed() >= config.max_browser_lifetime()
        {
            if !self.retired.swap(true, Ordering::AcqRel) {
                log::debug!("Retiring browser #{}", self.id);
            }
        }
    }
}

struct PoolInner {
    state: PoolState,
    browsers: Vec<Arc<PooledBrowser>>,
}

struct Lease {
    browser: Arc<PooledBrowser>,
    _permit: OwnedSemaphorePermit,
}

#[derive(Default)]
struct Counters {
    launched: AtomicUsize,
    closed: AtomicUsize,
    pages_opened: AtomicUsize,
    pages_closed: AtomicUsize,
}

/// Shared headless browser pool.
pub struct BrowserPool {
    launcher: Arc<dyn BrowserLauncher>,
    config: PoolConfig,
    inner: Mutex<PoolInner>,
    next_id: AtomicUsize,
    counters: Counters,
    /// Signalled whenever a browser is closed
    browser_closed: Notify,
}

impl BrowserPool {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: PoolConfig) -> Self {
        Self {
            launcher,
            config,
            inner: Mutex::new(PoolInner {
                state: PoolState::Created,
                browsers: Vec::new(),
            }),
            next_id: AtomicUsize::new(1),
            counters: Counters::default(),
            browser_closed: Notify::new(),
        }
    }

    /// Start accepting work. Idempotent while running.
    pub async fn init(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            PoolState::Running => return Ok(()),
            PoolState::ShutDown => return Err(AppError::browser("browser pool was shut down")),
            PoolState::Created => {}
        }

        if self.config.warm_start {
            let browser = self.launch_browser().await?;
            inner.browsers.push(browser);
        }
        inner.state = PoolState::Running;
        log::info!(
            "Browser pool ready (max {} browsers, {} pages each)",
            self.config.max_browsers,
            self.config.max_open_pages_per_browser
        );
        Ok(())
    }

    /// Close every browser. Later renders fail.
    pub async fn shutdown(&self) {
        let browsers = {
            let mut inner = self.inner.lock().await;
            inner.state = PoolState::ShutDown;
            std::mem::take(&mut inner.browsers)
        };

        for browser in browsers {
            self.close_browser(&browser).await;
        }
        log::info!("Browser pool shut down");
    }

    pub async fn state(&self) -> PoolState {
        self.inner.lock().await.state
    }

    pub async fn stats(&self) -> PoolStats {
        let live_browsers = self.inner.lock().await.browsers.len();
        PoolStats {
            live_browsers,
            browsers_launched: self.counters.launched.load(Ordering::Acquire),
            browsers_closed: self.counters.closed.load(Ordering::Acquire),
            pages_opened: self.counters.pages_opened.load(Ordering::Acquire),
            pages_closed: self.counters.pages_closed.load(Ordering::Acquire),
        }
    }

    /// Render `url` on a pooled page within `timeout`.
    ///
    /// The page is closed and its slot released on every outcome.
    pub async fn render(&self, url: &str, timeout: Duration, settle: Duration) -> Result<String> {
        let deadline = tokio::time::Instant::now() + timeout;

        let lease = match tokio::time::timeout_at(deadline, self.checkout()).await {
            Ok(lease) => lease?,
            Err(_) => {
                return Err(AppError::fetch(
                    FetchErrorKind::Timeout,
                    format!("no browser page available within {timeout:?}"),
                ));
            }
        };

        let result = self.render_on(&lease, url, deadline, timeout, settle).await;
        self.release(lease).await;
        result
    }

    async fn render_on(
        &self,
        lease: &Lease,
        url: &str,
        deadline: tokio::time::Instant,
        timeout: Duration,
        settle: Duration,
    ) -> Result<String> {
        let timed_out = || {
            AppError::fetch(
                FetchErrorKind::Timeout,
                format!("rendering {url} timed out after {timeout:?}"),
            )
        };

        let mut page = match tokio::time::timeout_at(deadline, lease.browser.handle.open_page()).await
        {
            Ok(page) => page?,
            Err(_) => return Err(timed_out()),
        };
        self.counters.pages_opened.fetch_add(1, Ordering::AcqRel);

        let rendered = tokio::time::timeout_at(deadline, page.render(url, settle)).await;

        match tokio::time::timeout(self.config.close_timeout(), page.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Failed to close page for {}: {}", url, e),
            Err(_) => log::warn!("Closing page for {} timed out", url),
        }
        self.counters.pages_closed.fetch_add(1, Ordering::AcqRel);

        rendered.unwrap_or_else(|_| Err(timed_out()))
    }

    async fn checkout(&self) -> Result<Lease> {
        loop {
            let (busy, closed) = {
                let mut inner = self.inner.lock().await;
                if inner.state != PoolState::Running {
                    return Err(AppError::browser("browser pool is not running"));
                }

                self.sweep(&mut inner).await;

                // take a free slot under the lock so a sweep cannot close it first
                if let Some(free) = least_loaded(&inner.browsers) {
                    if let Ok(permit) = free.pages.clone().try_acquire_owned() {
                        return Ok(self.lease(free, permit));
                    }
                }

                // draining browsers are still running processes
                if inner.browsers.len() < self.config.max_browsers {
                    let browser = self.launch_browser().await?;
                    inner.browsers.push(browser.clone());
                    let permit = browser
                        .pages
                        .clone()
                        .try_acquire_owned()
                        .map_err(AppError::browser)?;
                    return Ok(self.lease(browser, permit));
                }

                // registered before unlocking so no close is missed
                let closed = self.browser_closed.notified();
                let busy = inner
                    .browsers
                    .iter()
                    .filter(|b| !b.is_retired())
                    .min_by_key(|b| b.served.load(Ordering::Acquire))
                    .cloned();
                (busy, closed)
            };

            let Some(browser) = busy else {
                // at the cap with every browser draining
                closed.await;
                continue;
            };

            tokio::select! {
                acquired = browser.pages.clone().acquire_owned() => match acquired {
                    Ok(permit) if !browser.is_retired() => return Ok(self.lease(browser, permit)),
                    Ok(permit) => {
                        drop(permit);
                        let mut inner = self.inner.lock().await;
                        self.sweep(&mut inner).await;
                    }
                    // closed by a sweep while waiting
                    Err(_) => {}
                },
                _ = closed => {}
            }
        }
    }

    fn lease(&self, browser: Arc<PooledBrowser>, permit: OwnedSemaphorePermit) -> Lease {
        browser.served.fetch_add(1, Ordering::AcqRel);
        browser.retire_if_spent(&self.config);
        Lease {
            browser,
            _permit: permit,
        }
    }

    async fn release(&self, lease: Lease) {
        let browser = lease.browser.clone();
        drop(lease);

        if browser.is_retired() && browser.is_idle(self.config.max_open_pages_per_browser) {
            let mut inner = self.inner.lock().await;
            self.sweep(&mut inner).await;
        }
    }

    /// Retire spent browsers and close the idle retired ones.
    async fn sweep(&self, inner: &mut PoolInner) {
        let page_slots = self.config.max_open_pages_per_browser;
        let mut closing = Vec::new();

        inner.browsers.retain(|browser| {
            browser.retire_if_spent(&self.config);
            if browser.is_retired() && browser.is_idle(page_slots) {
                closing.push(browser.clone());
                false
            } else {
                true
            }
        });

        for browser in closing {
            self.close_browser(&browser).await;
        }
    }

    async fn launch_browser(&self) -> Result<Arc<PooledBrowser>> {
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        let handle = self.launcher.launch().await?;
        self.counters.launched.fetch_add(1, Ordering::AcqRel);
        log::info!("Launched browser #{}", id);

        Ok(Arc::new(PooledBrowser {
            id,
            handle,
            pages: Arc::new(Semaphore::new(self.config.max_open_pages_per_browser)),
            served: AtomicUsize::new(0),
            launched_at: Instant::now(),
            retired: AtomicBool::new(false),
        }))
    }

    async fn close_browser(&self, browser: &PooledBrowser) {
        browser.pages.close();
        match tokio::time::timeout(self.config.close_timeout(), browser.handle.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Failed to close browser #{}: {}", browser.id, e),
            Err(_) => log::warn!(
                "Closing browser #{} timed out after {:?}",
                browser.id,
                self.config.close_timeout()
            ),
        }
        self.counters.closed.fetch_add(1, Ordering::AcqRel);
        self.browser_closed.notify_waiters();
        log::debug!(
            "Closed browser #{} after {} pages",
            browser.id,
            browser.served.load(Ordering::Acquire)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Tally {
        launched: AtomicUsize,
        closed: AtomicUsize,
        live_browsers: AtomicUsize,
        peak_browsers: AtomicUsize,
        open_pages: AtomicUsize,
        peak_pages: AtomicUsize,
        hang_on_close: AtomicBool,
    }

    struct FakeLauncher {
        tally: Arc<Tally>,
    }

    struct FakeBrowser {
        tally: Arc<Tally>,
    }

    struct FakePage {
        tally: Arc<Tally>,
        open: bool,
    }

    #[async_trait]
    impl BrowserLauncher for FakeLauncher {
        async fn launch(&self) -> Result<Box<dyn BrowserHandle>> {
            self.tally.launched.fetch_add(1, Ordering::SeqCst);
            let live = self.tally.live_browsers.fetch_add(1, Ordering::SeqCst) + 1;
            self.tally.peak_browsers.fetch_max(live, Ordering::SeqCst);
            Ok(Box::new(FakeBrowser {
                tally: self.tally.clone(),
            }))
        }
    }

    #[async_trait]
    impl BrowserHandle for FakeBrowser {
        async fn open_page(&self) -> Result<Box<dyn BrowserPage>> {
            let open = self.tally.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
            self.tally.peak_pages.fetch_max(open, Ordering::SeqCst);
            Ok(Box::new(FakePage {
                tally: self.tally.clone(),
                open: true,
            }))
        }

        async fn close(&self) -> Result<()> {
            self.tally.closed.fetch_add(1, Ordering::SeqCst);
            self.tally.live_browsers.fetch_sub(1, Ordering::SeqCst);
            if self.tally.hang_on_close.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(())
        }
    }

    #[async_trait]
    impl BrowserPage for FakePage {
        async fn render(&mut self, url: &str, _settle: Duration) -> Result<String> {
            if url.contains("slow") {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            if url.contains("broken") {
                return Err(AppError::browser("net::ERR_NAME_NOT_RESOLVED"));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(format!("<html><body>{url}</body></html>"))
        }

        async fn close(&mut self) -> Result<()> {
            if self.open {
                self.open = false;
                self.tally.open_pages.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    fn pool_with(config: PoolConfig) -> (BrowserPool, Arc<Tally>) {
        let tally = Arc::new(Tally::default());
        let launcher = Arc::new(FakeLauncher {
            tally: tally.clone(),
        });
        (BrowserPool::new(launcher, config), tally)
    }

    const TIMEOUT: Duration = Duration::from_secs(2);
    const SETTLE: Duration = Duration::from_millis(0);

    #[tokio::test]
    async fn test_render_returns_html_and_closes_page() {
        let (pool, tally) = pool_with(PoolConfig::default());
        pool.init().await.unwrap();

        let html = pool.render("https://a.test/", TIMEOUT, SETTLE).await.unwrap();
        assert!(html.contains("https://a.test/"));

        let stats = pool.stats().await;
        assert_eq!(stats.pages_opened, 1);
        assert_eq!(stats.pages_closed, 1);
        assert_eq!(tally.open_pages.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_render_before_init_fails() {
        let (pool, _) = pool_with(PoolConfig::default());
        assert_eq!(pool.state().await, PoolState::Created);
        assert!(pool.render("https://a.test/", TIMEOUT, SETTLE).await.is_err());
    }

    #[tokio::test]
    async fn test_timeout_closes_page() {
        let (pool, tally) = pool_with(PoolConfig::default());
        pool.init().await.unwrap();

        let err = pool
            .render("https://slow.test/", Duration::from_millis(100), SETTLE)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Fetch {
                kind: FetchErrorKind::Timeout,
                ..
            }
        ));
        assert_eq!(tally.open_pages.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_navigation_error_closes_page() {
        let (pool, tally) = pool_with(PoolConfig::default());
        pool.init().await.unwrap();

        let err = pool
            .render("https://broken.test/", TIMEOUT, SETTLE)
            .await
            .unwrap_err();
        assert_eq!(FetchErrorKind::classify(&err), FetchErrorKind::NetworkError);
        assert_eq!(tally.open_pages.load(Ordering::SeqCst), 0);

        // the slot was released
        assert!(pool.render("https://a.test/", TIMEOUT, SETTLE).await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_closes_browsers_and_rejects_work() {
        let (pool, tally) = pool_with(PoolConfig::default());
        pool.init().await.unwrap();
        pool.render("https://a.test/", TIMEOUT, SETTLE).await.unwrap();

        pool.shutdown().await;
        assert_eq!(pool.state().await, PoolState::ShutDown);
        assert_eq!(tally.closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().await.live_browsers, 0);

        assert!(pool.render("https://a.test/", TIMEOUT, SETTLE).await.is_err());
        assert!(pool.init().await.is_err());
    }

    #[tokio::test]
    async fn test_browser_recycled_after_page_budget() {
        let config = PoolConfig {
            max_browsers: 1,
            max_pages_per_browser: 2,
            ..PoolConfig::default()
        };
        let (pool, tally) = pool_with(config);
        pool.init().await.unwrap();

        for i in 0..5 {
            let url = format!("https://a.test/{i}");
            pool.render(&url, TIMEOUT, SETTLE).await.unwrap();
        }

        assert_eq!(tally.launched.load(Ordering::SeqCst), 3);
        assert_eq!(tally.closed.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().await.live_browsers, 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let config = PoolConfig {
            max_browsers: 1,
            max_open_pages_per_browser: 2,
            ..PoolConfig::default()
        };
        let (pool, tally) = pool_with(config);
        pool.init().await.unwrap();

        let renders = (0..6).map(|i| {
            let url = format!("https://a.test/{i}");
            let pool = &pool;
            async move { pool.render(&url, TIMEOUT, SETTLE).await }
        });
        let results = futures::future::join_all(renders).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(tally.launched.load(Ordering::SeqCst), 1);
        assert!(tally.peak_pages.load(Ordering::SeqCst) <= 2);
        assert_eq!(tally.open_pages.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_draining_browsers_count_toward_cap() {
        let config = PoolConfig {
            max_browsers: 1,
            max_pages_per_browser: 1,
            ..PoolConfig::default()
        };
        let (pool, tally) = pool_with(config);
        pool.init().await.unwrap();

        let renders = (0..6).map(|i| {
            let url = format!("https://a.test/{i}");
            let pool = &pool;
            async move { pool.render(&url, TIMEOUT, SETTLE).await }
        });
        let results = futures::future::join_all(renders).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(tally.peak_browsers.load(Ordering::SeqCst), 1);
        assert_eq!(tally.launched.load(Ordering::SeqCst), 6);
        assert_eq!(tally.closed.load(Ordering::SeqCst), 6);
        assert_eq!(pool.stats().await.live_browsers, 0);
    }

    #[tokio::test]
    async fn test_cap_holds_with_several_browsers() {
        let config = PoolConfig {
            max_browsers: 2,
            max_open_pages_per_browser: 1,
            max_pages_per_browser: 2,
            ..PoolConfig::default()
        };
        let (pool, tally) = pool_with(config);
        pool.init().await.unwrap();

        let renders = (0..10).map(|i| {
            let url = format!("https://a.test/{i}");
            let pool = &pool;
            async move { pool.render(&url, TIMEOUT, SETTLE).await }
        });
        let results = futures::future::join_all(renders).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert!(tally.peak_browsers.load(Ordering::SeqCst) <= 2);
        assert!(tally.peak_pages.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_shutdown_bounded_when_close_hangs() {
        let config = PoolConfig {
            close_timeout_ms: 50,
            ..PoolConfig::default()
        };
        let (pool, tally) = pool_with(config);
        pool.init().await.unwrap();
        pool.render("https://a.test/", TIMEOUT, SETTLE).await.unwrap();

        tally.hang_on_close.store(true, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(2), pool.shutdown())
            .await
            .expect("shutdown finished");
        assert_eq!(pool.stats().await.browsers_closed, 1);
    }

    #[tokio::test]
    async fn test_warm_start_launches_on_init() {
        let config = PoolConfig {
            warm_start: true,
            ..PoolConfig::default()
        };
        let (pool, tally) = pool_with(config);
        pool.init().await.unwrap();
        assert_eq!(tally.launched.load(Ordering::SeqCst), 1);
        assert_eq!(pool.state().await, PoolState::Running);
    }
}
