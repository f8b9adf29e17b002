//! Scriptable page rendering through a Crawl4AI sidecar.
//!
//! The browser strategy needs a context that executes page scripts and
//! carries their cookies across navigations. That context lives in a separate
//! Crawl4AI service; this module only speaks its `/crawl` API.

use super::format_http_error;
use crate::config::DESKTOP_USER_AGENT;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// A rendered page after scripts ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// Final document markup
    pub html: String,
    /// URL the context ended up on after redirects and script navigation
    pub final_url: String,
}

/// A context able to load a page, run its scripts and wait for a condition
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Load `url` and wait until the JavaScript expression `wait_condition`
    /// holds or `wait` elapses.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be rendered.
    async fn render(&self, url: &str, wait_condition: &str, wait: Duration) -> Result<RenderedPage>;
}

/// Renderer backed by a Crawl4AI service
pub struct Crawl4aiRenderer {
    base_url: String,
    client: reqwest::Client,
}

impl Crawl4aiRenderer {
    /// Renderer for the service at `base_url`; `timeout` bounds each call.
    #[must_use]
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: super::create_http_client(timeout),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CrawlResponse {
    #[serde(default)]
    results: Vec<CrawlResult>,
}

#[derive(Debug, Deserialize)]
struct CrawlResult {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    redirected_url: Option<String>,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error_message: Option<String>,
}

fn build_render_body(url: &str, wait_condition: &str, wait: Duration) -> Value {
    let page_timeout = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
    json!({
        "urls": [url],
        "browser_config": {
            "type": "BrowserConfig",
            "params": {
                "headless": true,
                "user_agent": DESKTOP_USER_AGENT,
                "extra_args": ["--no-sandbox", "--disable-dev-shm-usage"]
            }
        },
        "crawler_config": {
            "type": "CrawlerRunConfig",
            "params": {
                "cache_mode": "bypass",
                "wait_for": format!("js:{wait_condition}"),
                "page_timeout": page_timeout
            }
        }
    })
}

#[async_trait]
impl PageRenderer for Crawl4aiRenderer {
    async fn render(&self, url: &str, wait_condition: &str, wait: Duration) -> Result<RenderedPage> {
        let endpoint = format!("{}/crawl", self.base_url);
        debug!(endpoint = %endpoint, target = %url, wait_ms = wait.as_millis(), "Render request");

        let response = self
            .client
            .post(endpoint)
            .json(&build_render_body(url, wait_condition, wait))
            .send()
            .await
            .map_err(|e| anyhow!("Render request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!(format_http_error(status, &text)));
        }

        let payload: CrawlResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Render response unreadable: {e}"))?;

        let result = payload
            .results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Render response had no results"))?;

        if !result.success {
            return Err(anyhow!(
                "Render failed: {}",
                result.error_message.unwrap_or_else(|| "unknown error".to_string())
            ));
        }

        let final_url = result
            .redirected_url
            .or(result.url)
            .unwrap_or_else(|| url.to_string());

        Ok(RenderedPage {
            html: result.html.unwrap_or_default(),
            final_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use httpmock::MockServer;

    #[test]
    fn test_render_body_carries_wait_condition() {
        let body = build_render_body("https://a.example/x", "() => true", Duration::from_secs(10));
        assert_eq!(body["urls"][0], "https://a.example/x");
        assert_eq!(body["crawler_config"]["params"]["wait_for"], "js:() => true");
        assert_eq!(body["crawler_config"]["params"]["page_timeout"], 10_000);
        assert_eq!(body["browser_config"]["params"]["headless"], true);
    }

    #[tokio::test]
    async fn test_render_returns_html_and_final_url() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/crawl");
                then.status(200).json_body(json!({
                    "success": true,
                    "results": [{
                        "url": "https://a.example/x",
                        "redirected_url": "https://a.example/x?i=1",
                        "html": "<pre>{}</pre>",
                        "success": true
                    }]
                }));
            })
            .await;

        let renderer = Crawl4aiRenderer::new(&server.base_url(), Duration::from_secs(5));
        let page = renderer
            .render("https://a.example/x", "() => true", Duration::from_secs(1))
            .await?;

        assert_eq!(page.html, "<pre>{}</pre>");
        assert_eq!(page.final_url, "https://a.example/x?i=1");
        mock.assert_hits_async(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_render_failure_is_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/crawl");
                then.status(200).json_body(json!({
                    "success": false,
                    "results": [{"success": false, "error_message": "Wait condition failed: Timeout"}]
                }));
            })
            .await;

        let renderer = Crawl4aiRenderer::new(&server.base_url(), Duration::from_secs(5));
        let result = renderer
            .render("https://a.example/x", "() => true", Duration::from_secs(1))
            .await;

        let err = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("Timeout"), "{err}");
    }

    #[tokio::test]
    async fn test_render_http_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/crawl");
                then.status(503).body("<html>down</html>");
            })
            .await;

        let renderer = Crawl4aiRenderer::new(&server.base_url(), Duration::from_secs(5));
        let result = renderer
            .render("https://a.example/x", "() => true", Duration::from_secs(1))
            .await;

        let err = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("503"), "{err}");
    }
}
