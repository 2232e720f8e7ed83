//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Static and rendered fetch behavior
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Headless browser pool limits
    #[serde(default)]
    pub pool: PoolConfig,

    /// Content-sufficiency heuristic used to decide on rendering
    #[serde(default)]
    pub content: SufficiencyConfig,

    /// List extraction and hierarchy snapshot bounds
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Subscription check policy
    #[serde(default)]
    pub check: CheckConfig,

    /// External selector advisor
    #[serde(default)]
    pub advisor: AdvisorConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetch.user_agent is empty"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(AppError::validation("fetch.timeout_secs must be > 0"));
        }
        if self.fetch.browser_timeout_secs == 0 {
            return Err(AppError::validation(
                "fetch.browser_timeout_secs must be > 0",
            ));
        }
        if self.pool.max_browsers == 0 {
            return Err(AppError::validation("pool.max_browsers must be > 0"));
        }
        if self.pool.max_open_pages_per_browser == 0 {
            return Err(AppError::validation(
                "pool.max_open_pages_per_browser must be > 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.content.min_meaningful_ratio) {
            return Err(AppError::validation(
                "content.min_meaningful_ratio must be within 0.0..=1.0",
            ));
        }
        if self.extract.hierarchy_depth == 0 {
            return Err(AppError::validation("extract.hierarchy_depth must be > 0"));
        }
        if self.extract.container_min_links == 0 {
            return Err(AppError::validation(
                "extract.container_min_links must be > 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.check.refresh_probability) {
            return Err(AppError::validation(
                "check.refresh_probability must be within 0.0..=1.0",
            ));
        }
        if self.check.max_concurrent == 0 {
            return Err(AppError::validation("check.max_concurrent must be > 0"));
        }
        if self.check.default_interval_mins == 0 {
            return Err(AppError::validation(
                "check.default_interval_mins must be > 0",
            ));
        }
        Ok(())
    }
}

/// Static HTTP and rendered fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Static request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Rendered fetch timeout in seconds (page open + navigation + settle)
    #[serde(default = "defaults::browser_timeout")]
    pub browser_timeout_secs: u64,

    /// Time to let client-side rendering settle after navigation
    #[serde(default = "defaults::settle")]
    pub settle_ms: u64,

    /// Escalate to a headless browser when static content is insufficient
    #[serde(default = "defaults::enable_browser")]
    pub enable_browser: bool,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn browser_timeout(&self) -> Duration {
        Duration::from_secs(self.browser_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            browser_timeout_secs: defaults::browser_timeout(),
            settle_ms: defaults::settle(),
            enable_browser: defaults::enable_browser(),
        }
    }
}

/// Headless browser pool limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of browser processes kept alive
    #[serde(default = "defaults::max_browsers")]
    pub max_browsers: usize,

    /// Concurrent pages allowed per browser
    #[serde(default = "defaults::max_open_pages_per_browser")]
    pub max_open_pages_per_browser: usize,

    /// Pages a browser may serve before it is retired
    #[serde(default = "defaults::max_pages_per_browser")]
    pub max_pages_per_browser: usize,

    /// Seconds a browser may live before it is retired
    #[serde(default = "defaults::max_browser_lifetime")]
    pub max_browser_lifetime_secs: u64,

    /// Upper bound in milliseconds on closing a page or a browser
    #[serde(default = "defaults::close_timeout")]
    pub close_timeout_ms: u64,

    /// Launch one browser during `init` instead of on first use
    #[serde(default)]
    pub warm_start: bool,

    /// Extra command line arguments for the browser process
    #[serde(default = "defaults::launch_args")]
    pub launch_args: Vec<String>,
}

impl PoolConfig {
    pub fn max_browser_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_browser_lifetime_secs)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_browsers: defaults::max_browsers(),
            max_open_pages_per_browser: defaults::max_open_pages_per_browser(),
            max_pages_per_browser: defaults::max_pages_per_browser(),
            max_browser_lifetime_secs: defaults::max_browser_lifetime(),
            close_timeout_ms: defaults::close_timeout(),
            warm_start: false,
            launch_args: defaults::launch_args(),
        }
    }
}

/// Thresholds for the content-sufficiency predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SufficiencyConfig {
    /// Minimum content length in grapheme clusters
    #[serde(default = "defaults::min_length")]
    pub min_length: usize,

    /// Minimum share of letters/digits among non-whitespace characters
    #[serde(default = "defaults::min_meaningful_ratio")]
    pub min_meaningful_ratio: f64,

    /// Placeholder phrases that mark a page as still loading
    #[serde(default = "defaults::loading_phrases")]
    pub loading_phrases: Vec<String>,
}

impl Default for SufficiencyConfig {
    fn default() -> Self {
        Self {
            min_length: defaults::min_length(),
            min_meaningful_ratio: defaults::min_meaningful_ratio(),
            loading_phrases: defaults::loading_phrases(),
        }
    }
}

/// List extraction and hierarchy snapshot bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Depth of the serialized container snapshot
    #[serde(default = "defaults::hierarchy_depth")]
    pub hierarchy_depth: usize,

    /// Children serialized per node before eliding the rest
    #[serde(default = "defaults::max_children")]
    pub max_children: usize,

    /// Characters of an href kept in the snapshot
    #[serde(default = "defaults::href_max_chars")]
    pub href_max_chars: usize,

    /// Characters of text kept in the snapshot
    #[serde(default = "defaults::text_max_chars")]
    pub text_max_chars: usize,

    /// Ancestors climbed from a single matched link
    #[serde(default = "defaults::climb_depth")]
    pub climb_depth: usize,

    /// Links an ancestor must contain to count as the list container
    #[serde(default = "defaults::container_min_links")]
    pub container_min_links: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            hierarchy_depth: defaults::hierarchy_depth(),
            max_children: defaults::max_children(),
            href_max_chars: defaults::href_max_chars(),
            text_max_chars: defaults::text_max_chars(),
            climb_depth: defaults::climb_depth(),
            container_min_links: defaults::container_min_links(),
        }
    }
}

/// Subscription check policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Chance of refreshing cached stable selectors on a successful check
    #[serde(default = "defaults::refresh_probability")]
    pub refresh_probability: f64,

    /// Ranked stable selectors kept per subscription
    #[serde(default = "defaults::max_stable_selectors")]
    pub max_stable_selectors: usize,

    /// Interval used when a watch is created without one
    #[serde(default = "defaults::default_interval")]
    pub default_interval_mins: u32,

    /// Subscriptions checked concurrently by `run`
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            refresh_probability: defaults::refresh_probability(),
            max_stable_selectors: defaults::max_stable_selectors(),
            default_interval_mins: defaults::default_interval(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// External selector advisor endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorConfig {
    /// Base URL of the advisor service; hints are disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Advisor request timeout in seconds
    #[serde(default = "defaults::advisor_timeout")]
    pub timeout_secs: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: defaults::advisor_timeout(),
        }
    }
}

mod defaults {
    // Fetch defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; listwatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        20
    }
    pub fn browser_timeout() -> u64 {
        45
    }
    pub fn settle() -> u64 {
        1500
    }
    pub fn enable_browser() -> bool {
        true
    }

    // Pool defaults
    pub fn max_browsers() -> usize {
        2
    }
    pub fn max_open_pages_per_browser() -> usize {
        4
    }
    pub fn max_pages_per_browser() -> usize {
        100
    }
    pub fn max_browser_lifetime() -> u64 {
        30 * 60
    }
    pub fn close_timeout() -> u64 {
        5_000
    }
    pub fn launch_args() -> Vec<String> {
        vec![
            "--disable-dev-shm-usage".into(),
            "--disable-gpu".into(),
            "--disable-extensions".into(),
            "--no-first-run".into(),
        ]
    }

    // Content defaults
    pub fn min_length() -> usize {
        500
    }
    pub fn min_meaningful_ratio() -> f64 {
        0.3
    }
    pub fn loading_phrases() -> Vec<String> {
        vec![
            "Loading...".into(),
            "Loading…".into(),
            "Please wait".into(),
            "加载中".into(),
            "読み込み中".into(),
            "로딩 중".into(),
        ]
    }

    // Extract defaults
    pub fn hierarchy_depth() -> usize {
        5
    }
    pub fn max_children() -> usize {
        12
    }
    pub fn href_max_chars() -> usize {
        50
    }
    pub fn text_max_chars() -> usize {
        30
    }
    pub fn climb_depth() -> usize {
        10
    }
    pub fn container_min_links() -> usize {
        2
    }

    // Check defaults
    pub fn refresh_probability() -> f64 {
        0.1
    }
    pub fn max_stable_selectors() -> usize {
        5
    }
    pub fn default_interval() -> u32 {
        60
    }
    pub fn max_concurrent() -> usize {
        4
    }

    // Advisor defaults
    pub fn advisor_timeout() -> u64 {
        30
    }
}
