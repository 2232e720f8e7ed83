// src/fetch/http.rs

//! Static HTTP fetching.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{FetchErrorKind, FetchOptions, FetchResult, PageFetcher};
use crate::error::Result;
use crate::models::{FetchConfig, RenderType};

/// Plain HTTP GET without script execution.
pub struct StaticFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

struct StaticPage {
    status: u16,
    final_url: String,
    body: String,
}

impl StaticFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            timeout: config.timeout(),
        })
    }

    async fn get(&self, url: &str) -> Result<StaticPage> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok(StaticPage {
            status,
            final_url,
            body,
        })
    }
}

impl StaticPage {
    fn into_result(self, url: &str, started: Instant) -> FetchResult {
        let mut result = match FetchErrorKind::from_status(self.status) {
            Some(kind) => {
                log::debug!("Static fetch {} -> HTTP {}", url, self.status);
                FetchResult::failed(
                    kind,
                    format!("HTTP {} for {}", self.status, url),
                    RenderType::Static,
                    started,
                )
            }
            None => {
                log::debug!(
                    "Static fetch {} -> {} ({} bytes)",
                    url,
                    self.status,
                    self.body.len()
                );
                FetchResult::ok(self.body, RenderType::Static, started)
            }
        };
        result.status = Some(self.status);
        result.final_url = Some(self.final_url);
        result
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> FetchResult {
        let started = Instant::now();
        let timeout = options.timeout.unwrap_or(self.timeout);

        match tokio::time::timeout(timeout, self.get(url)).await {
            Ok(Ok(page)) => page.into_result(url, started),
            Ok(Err(e)) => {
                log::debug!("Static fetch {} failed: {}", url, e);
                FetchResult::from_error(&e, RenderType::Static, started)
            }
            Err(_) => FetchResult::failed(
                FetchErrorKind::Timeout,
                format!("Static fetch of {url} timed out after {timeout:?}"),
                RenderType::Static,
                started,
            ),
        }
    }
}
