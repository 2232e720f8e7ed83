// src/fetch/chromium.rs

//! Chromium launcher backed by the DevTools protocol.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use super::pool::{BrowserHandle, BrowserLauncher, BrowserPage};
use crate::error::{AppError, Result};
use crate::models::{FetchConfig, PoolConfig};

/// Launches headless Chromium processes.
pub struct ChromiumLauncher {
    user_agent: String,
    request_timeout: Duration,
    close_timeout: Duration,
    launch_args: Vec<String>,
}

impl ChromiumLauncher {
    pub fn new(fetch: &FetchConfig, pool: &PoolConfig) -> Self {
        Self {
            user_agent: fetch.user_agent.clone(),
            request_timeout: fetch.browser_timeout(),
            close_timeout: pool.close_timeout(),
            launch_args: pool.launch_args.clone(),
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserHandle>> {
        let config = BrowserConfig::builder()
            .request_timeout(self.request_timeout)
            .args(self.launch_args.iter().map(String::as_str))
            .arg(format!("--user-agent={}", self.user_agent))
            .build()
            .map_err(|e| AppError::browser(format!("invalid browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::browser(format!("failed to launch browser: {e}")))?;

        // the handler must be polled for the connection to make progress
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Box::new(ChromiumBrowser {
            browser: Arc::new(Mutex::new(browser)),
            events,
            open_timeout: self.request_timeout,
            close_timeout: self.close_timeout,
        }))
    }
}

struct ChromiumBrowser {
    browser: Arc<Mutex<Browser>>,
    events: JoinHandle<()>,
    open_timeout: Duration,
    close_timeout: Duration,
}

#[async_trait]
impl BrowserHandle for ChromiumBrowser {
    async fn open_page(&self) -> Result<Box<dyn BrowserPage>> {
        let (tx, rx) = oneshot::channel();
        let browser = Arc::clone(&self.browser);
        let limit = self.open_timeout;

        // runs to completion even when the caller gives up
        tokio::spawn(async move {
            let opened = tokio::time::timeout(limit, async {
                browser.lock().await.new_page("about:blank").await
            })
            .await;

            let page = match opened {
                Ok(Ok(page)) => page,
                Ok(Err(e)) => {
                    let _ = tx.send(Err(AppError::browser(format!("failed to open page: {e}"))));
                    return;
                }
                Err(_) => {
                    let _ = tx.send(Err(AppError::browser(format!(
                        "opening a page timed out after {limit:?}"
                    ))));
                    return;
                }
            };

            if let Err(Ok(orphan)) = tx.send(Ok(page)) {
                log::debug!("Closing page opened after its render was abandoned");
                let _ = tokio::time::timeout(limit, orphan.close()).await;
            }
        });

        let page = rx
            .await
            .map_err(|_| AppError::browser("page open task ended unexpectedly"))??;
        Ok(Box::new(ChromiumPage { page: Some(page) }))
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        let closed = match tokio::time::timeout(self.close_timeout, browser.close()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(AppError::browser(format!("failed to close browser: {e}"))),
            Err(_) => Err(AppError::browser(format!(
                "closing browser timed out after {:?}",
                self.close_timeout
            ))),
        };
        if tokio::time::timeout(self.close_timeout, browser.wait())
            .await
            .is_err()
        {
            log::warn!("Browser process did not exit within {:?}", self.close_timeout);
        }
        self.events.abort();
        closed
    }
}

struct ChromiumPage {
    page: Option<Page>,
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn render(&mut self, url: &str, settle: Duration) -> Result<String> {
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| AppError::browser("page already closed"))?;

        page.goto(url)
            .await
            .map_err(|e| AppError::browser(format!("navigation to {url} failed: {e}")))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| AppError::browser(format!("navigation to {url} failed: {e}")))?;

        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        page.content()
            .await
            .map_err(|e| AppError::browser(format!("failed to read DOM of {url}: {e}")))
    }

    async fn close(&mut self) -> Result<()> {
        match self.page.take() {
            Some(page) => page
                .close()
                .await
                .map_err(|e| AppError::browser(format!("failed to close page: {e}"))),
            None => Ok(()),
        }
    }
}
