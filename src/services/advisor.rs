//! Selector advisor client.
//!
//! The advisor is an external service that reads a container snapshot and
//! proposes selectors likely to survive redesigns. Its answers are hints:
//! empty or malformed responses are treated as "no suggestion".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::AdvisorConfig;

/// Source of stable selector suggestions.
#[async_trait]
pub trait SelectorAdvisor: Send + Sync {
    /// Ranked selectors for the container described by `hierarchy`.
    async fn extract_stable_selectors(
        &self,
        hierarchy: &str,
        current_selector: &str,
    ) -> Result<Vec<String>>;

    /// Selector of the deepest node holding all of `target_urls`.
    async fn find_lca(&self, hierarchy: &str, target_urls: &[String]) -> Result<Option<String>>;
}

/// Advisor that never suggests anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAdvisor;

#[async_trait]
impl SelectorAdvisor for NoopAdvisor {
    async fn extract_stable_selectors(&self, _: &str, _: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn find_lca(&self, _: &str, _: &[String]) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Serialize)]
struct StableSelectorsRequest<'a> {
    hierarchy: &'a str,
    current_selector: &'a str,
}

#[derive(Serialize)]
struct LcaRequest<'a> {
    hierarchy: &'a str,
    target_urls: &'a [String],
}

/// JSON-over-HTTP advisor.
///
/// - `POST {endpoint}/stable-selectors` with `{hierarchy, current_selector}`
///   answers `{"selectors": [...]}` or a bare array
/// - `POST {endpoint}/lca` with `{hierarchy, target_urls}` answers
///   `{"selector": ...}` or a bare string
pub struct HttpAdvisor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAdvisor {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<Value> {
        let url = format!("{}/{}", self.endpoint, path);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::advisor(format!("{url} answered HTTP {status}")));
        }

        let text = response.text().await?;
        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(e) => {
                log::warn!("Advisor returned unparseable body from {}: {}", url, e);
                Ok(Value::Null)
            }
        }
    }
}

#[async_trait]
impl SelectorAdvisor for HttpAdvisor {
    async fn extract_stable_selectors(
        &self,
        hierarchy: &str,
        current_selector: &str,
    ) -> Result<Vec<String>> {
        let body = StableSelectorsRequest {
            hierarchy,
            current_selector,
        };
        let value = self.post("stable-selectors", &body).await?;
        Ok(selector_list(&value))
    }

    async fn find_lca(&self, hierarchy: &str, target_urls: &[String]) -> Result<Option<String>> {
        let body = LcaRequest {
            hierarchy,
            target_urls,
        };
        let value = self.post("lca", &body).await?;
        Ok(single_selector(&value))
    }
}

/// Advisor for the configured endpoint, or `NoopAdvisor` when unset.
pub fn advisor_from_config(config: &AdvisorConfig) -> Result<Arc<dyn SelectorAdvisor>> {
    match config.endpoint.as_deref().map(str::trim) {
        Some(endpoint) if !endpoint.is_empty() => {
            log::info!("Using selector advisor at {}", endpoint);
            Ok(Arc::new(HttpAdvisor::new(
                endpoint,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        _ => Ok(Arc::new(NoopAdvisor)),
    }
}

fn selector_list(value: &Value) -> Vec<String> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("selectors") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn single_selector(value: &Value) -> Option<String> {
    let selector = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("selector").and_then(Value::as_str)?,
        _ => return None,
    };
    let selector = selector.trim();
    (!selector.is_empty()).then(|| selector.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_selector_list_shapes() {
        assert_eq!(
            selector_list(&json!({"selectors": ["section.posts", " main > ul ", 3, ""]})),
            vec!["section.posts", "main > ul"]
        );
        assert_eq!(selector_list(&json!(["#feed"])), vec!["#feed"]);
        assert!(selector_list(&json!({"unexpected": true})).is_empty());
        assert!(selector_list(&Value::Null).is_empty());
        assert!(selector_list(&json!("section")).is_empty());
    }

    #[test]
    fn test_single_selector_shapes() {
        assert_eq!(
            single_selector(&json!({"selector": "section.posts"})),
            Some("section.posts".into())
        );
        assert_eq!(single_selector(&json!("#feed")), Some("#feed".into()));
        assert_eq!(single_selector(&json!({"selector": null})), None);
        assert_eq!(single_selector(&json!("  ")), None);
        assert_eq!(single_selector(&json!([1, 2])), None);
    }

    #[tokio::test]
    async fn test_noop_advisor_is_empty() {
        let advisor = NoopAdvisor;
        assert!(
            advisor
                .extract_stable_selectors("<ul></ul>", "ul")
                .await
                .unwrap()
                .is_empty()
        );
        assert!(advisor.find_lca("<ul></ul>", &[]).await.unwrap().is_none());
    }

    #[test]
    fn test_config_without_endpoint_uses_noop() {
        let config = AdvisorConfig::default();
        assert!(advisor_from_config(&config).is_ok());

        let config = AdvisorConfig {
            endpoint: Some("http://127.0.0.1:9/".into()),
            ..AdvisorConfig::default()
        };
        let advisor = HttpAdvisor::new(config.endpoint.as_deref().unwrap(), Duration::from_secs(1))
            .unwrap();
        assert_eq!(advisor.endpoint, "http://127.0.0.1:9");
    }
}
