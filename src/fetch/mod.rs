//! Page fetching.
//!
//! Implements a two-tier strategy:
//! - Tier 1: static HTTP (reqwest), cheap and tried first
//! - Tier 2: headless browser from a shared pool, for client-rendered pages
//!
//! `SmartFetcher` decides between the tiers per request, using the cached
//! render type when known and the content-sufficiency heuristic otherwise.

mod fixture;
mod http;
mod pool;
mod smart;
mod sufficiency;

#[cfg(feature = "chromium")]
mod chromium;

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::RenderType;

#[cfg(feature = "chromium")]
pub use chromium::ChromiumLauncher;
pub use fixture::FixtureFetcher;
pub use http::StaticFetcher;
pub use pool::{BrowserHandle, BrowserLauncher, BrowserPage, BrowserPool, PoolState, PoolStats};
pub use smart::{RenderedFetcher, SmartFetcher};
pub use sufficiency::{Sufficiency, check_content, is_content_sufficient};

/// Classified fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchErrorKind {
    /// HTTP 404
    NotFound,
    /// HTTP 403
    Forbidden,
    /// Any other HTTP status >= 400
    ServerError,
    Timeout,
    /// DNS or connection failure
    NetworkError,
    /// Rendered page still lacks usable content
    ExtractionError,
    Unknown,
}

impl FetchErrorKind {
    /// Kind for an HTTP status, `None` for non-error statuses.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            404 => Some(Self::NotFound),
            403 => Some(Self::Forbidden),
            s if s >= 400 => Some(Self::ServerError),
            _ => None,
        }
    }

    /// Classify an error raised while fetching.
    pub fn classify(error: &AppError) -> Self {
        match error {
            AppError::Fetch { kind, .. } => *kind,
            AppError::Http(e) => Self::from_reqwest(e),
            AppError::Browser(message) => Self::from_message(message),
            _ => Self::Unknown,
        }
    }

    fn from_reqwest(error: &reqwest::Error) -> Self {
        if let Some(kind) = error.status().and_then(|s| Self::from_status(s.as_u16())) {
            return kind;
        }
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() || error.is_request() {
            Self::NetworkError
        } else {
            Self::Unknown
        }
    }

    /// Classify browser errors by their message; CDP only reports strings.
    fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else if [
            "err_name_not_resolved",
            "err_connection",
            "err_internet_disconnected",
            "err_address_unreachable",
            "dns",
        ]
        .iter()
        .any(|marker| lower.contains(marker))
        {
            Self::NetworkError
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::ServerError => "SERVER_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::NetworkError => "NETWORK_ERROR",
            Self::ExtractionError => "EXTRACTION_ERROR",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Per-request fetch options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Known render type; `Unknown` enables detection
    pub render_type: RenderType,
    /// Render in a browser regardless of the render type
    pub force_browser: bool,
    /// Overrides the fetcher's configured timeout
    pub timeout: Option<Duration>,
}

impl FetchOptions {
    pub fn with_render_type(render_type: RenderType) -> Self {
        Self {
            render_type,
            ..Self::default()
        }
    }
}

/// Result of a fetch. Failures are values, never errors.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub success: bool,
    pub content: String,
    /// HTTP status when a response was received
    pub status: Option<u16>,
    pub final_url: Option<String>,
    pub error_kind: Option<FetchErrorKind>,
    pub error: Option<String>,
    /// How the content was obtained
    pub render_type: RenderType,
    pub duration_ms: u64,
}

impl FetchResult {
    pub fn ok(content: String, render_type: RenderType, started: Instant) -> Self {
        Self {
            success: true,
            content,
            render_type,
            duration_ms: elapsed_ms(started),
            ..Self::default()
        }
    }

    pub fn failed(
        kind: FetchErrorKind,
        message: impl Into<String>,
        render_type: RenderType,
        started: Instant,
    ) -> Self {
        Self {
            success: false,
            error_kind: Some(kind),
            error: Some(message.into()),
            render_type,
            duration_ms: elapsed_ms(started),
            ..Self::default()
        }
    }

    pub fn from_error(error: &AppError, render_type: RenderType, started: Instant) -> Self {
        Self::failed(
            FetchErrorKind::classify(error),
            error.to_string(),
            render_type,
            started,
        )
    }

    /// Error text with its classification, for logs and history rows.
    pub fn describe_error(&self) -> String {
        match (&self.error_kind, &self.error) {
            (Some(kind), Some(error)) => format!("{kind}: {error}"),
            (Some(kind), None) => kind.to_string(),
            (None, Some(error)) => error.clone(),
            (None, None) => "unknown fetch failure".to_string(),
        }
    }
}

/// Source of page HTML.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> FetchResult;
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(FetchErrorKind::from_status(404), Some(FetchErrorKind::NotFound));
        assert_eq!(FetchErrorKind::from_status(403), Some(FetchErrorKind::Forbidden));
        assert_eq!(FetchErrorKind::from_status(500), Some(FetchErrorKind::ServerError));
        assert_eq!(FetchErrorKind::from_status(429), Some(FetchErrorKind::ServerError));
        assert_eq!(FetchErrorKind::from_status(200), None);
        assert_eq!(FetchErrorKind::from_status(304), None);
    }

    #[test]
    fn test_browser_message_classification() {
        let dns = AppError::browser("net::ERR_NAME_NOT_RESOLVED at https://nope.invalid");
        assert_eq!(FetchErrorKind::classify(&dns), FetchErrorKind::NetworkError);

        let slow = AppError::browser("Request timed out.");
        assert_eq!(FetchErrorKind::classify(&slow), FetchErrorKind::Timeout);

        let other = AppError::browser("target crashed");
        assert_eq!(FetchErrorKind::classify(&other), FetchErrorKind::Unknown);

        let tagged = AppError::fetch(FetchErrorKind::Forbidden, "HTTP 403");
        assert_eq!(FetchErrorKind::classify(&tagged), FetchErrorKind::Forbidden);
    }

    #[test]
    fn test_kind_serializes_screaming_case() {
        let json = serde_json::to_string(&FetchErrorKind::NetworkError).unwrap();
        assert_eq!(json, "\"NETWORK_ERROR\"");
    }

    #[test]
    fn test_describe_error() {
        let result = FetchResult::failed(
            FetchErrorKind::Timeout,
            "took too long",
            RenderType::Static,
            Instant::now(),
        );
        assert!(!result.success);
        assert_eq!(result.describe_error(), "TIMEOUT: took too long");
    }
}
