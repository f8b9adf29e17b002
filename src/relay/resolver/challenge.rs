//! Strategies for the challenge-gated bulk-file provider.
//!
//! The resolution endpoint answers with structured data, but sits behind a
//! script challenge that sets a `__test` cookie and re-requests the page with
//! `i=1`. Two strategies get past it: rendering the page in a scriptable
//! context, or replaying the request with a known cookie value.

#![allow(clippy::non_std_lazy_statics)]

use super::render::PageRenderer;
use super::{endpoint_with_share_url, fetch_page, settle, ResolveStrategy};
use crate::config::DESKTOP_USER_AGENT;
use crate::relay::{ResolvedMedia, SourceReference};
use crate::utils::decode_entities;
use anyhow::Result;
use async_trait::async_trait;
use lazy_regex::lazy_regex;
use reqwest::cookie::Jar;
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Name used when the provider omits one
pub const DEFAULT_FILE_NAME: &str = "terabox_file";

/// Condition the rendering context waits for: data visible, or the challenge
/// navigated to the acknowledged URL
pub const CHALLENGE_WAIT_CONDITION: &str =
    "() => document.body.innerText.includes('{') || window.location.href.includes('&i=1')";

/// JSON object with a `status` key embedded in markup
static RE_EMBEDDED_PAYLOAD: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r#"\{[^<>]*"status"[^<>]*\}"#);

#[derive(Debug, Deserialize)]
struct ChallengePayload {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Vec<ChallengeEntry>,
}

#[derive(Debug, Deserialize)]
struct ChallengeEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    fast_stream_url: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    size_formatted: Option<String>,
}

impl ChallengePayload {
    fn into_media(self) -> Option<ResolvedMedia> {
        if self.status.as_deref() != Some("success") {
            debug!(status = ?self.status, "Challenge payload not successful");
            return None;
        }
        let entry = self.data.into_iter().next()?;
        let name = entry
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());

        ResolvedMedia::opaque_file(
            entry.fast_stream_url.unwrap_or_default(),
            name,
            entry.size_formatted,
            entry.thumbnail,
        )
    }
}

/// Interpret a body that is expected to be the payload itself.
fn parse_payload(text: &str) -> Option<ResolvedMedia> {
    serde_json::from_str::<ChallengePayload>(text.trim())
        .ok()?
        .into_media()
}

/// Find and interpret a payload embedded in rendered markup.
fn extract_embedded_payload(html: &str) -> Option<ResolvedMedia> {
    if !html.contains('{') || !html.contains("\"status\"") {
        return None;
    }
    let found = RE_EMBEDDED_PAYLOAD.find(html)?;
    parse_payload(&decode_entities(found.as_str()))
}

/// Whether `html` is the script challenge page
fn is_challenge_page(html: &str) -> bool {
    html.contains("__test") && html.contains("slowAES.decrypt")
}

/// Whether the challenge has already redirected to the acknowledged URL
fn is_acknowledged(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| u.query_pairs().any(|(k, v)| k == "i" && v == "1"))
}

/// The URL the challenge script navigates to once solved
fn acknowledged(target: &Url) -> Url {
    let mut url = target.clone();
    url.query_pairs_mut().append_pair("i", "1");
    url
}

/// A fresh cookie session; one per attempt so cookies never leak between
/// requests
fn session(timeout: Duration) -> Result<(reqwest::Client, Arc<Jar>)> {
    let jar = Arc::new(Jar::default());
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .cookie_provider(Arc::clone(&jar))
        .build()?;
    Ok((client, jar))
}

/// Store the solved challenge value for `url`
fn set_challenge_cookie(jar: &Jar, cookie: &str, url: &Url) {
    jar.add_cookie_str(&format!("__test={cookie}"), url);
}

/// Renders the endpoint in a scriptable context and reads the payload from
/// the resulting page
pub struct BrowserStrategy {
    renderer: Arc<dyn PageRenderer>,
    endpoint: Url,
    cookie: Option<String>,
    timeout: Duration,
    wait: Duration,
}

impl BrowserStrategy {
    /// Strategy rendering through `renderer`, waiting up to `wait` for the
    /// challenge to settle.
    ///
    /// The rendering context keeps its cookies, so the acknowledged URL is
    /// fetched with `cookie` as the `__test` value; `timeout` bounds that
    /// request.
    #[must_use]
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        endpoint: Url,
        cookie: Option<String>,
        timeout: Duration,
        wait: Duration,
    ) -> Self {
        Self {
            renderer,
            endpoint,
            cookie,
            timeout,
            wait,
        }
    }

    async fn run(&self, reference: &SourceReference) -> Result<Option<ResolvedMedia>> {
        let target = endpoint_with_share_url(&self.endpoint, &reference.raw_url);
        let page = self
            .renderer
            .render(target.as_str(), CHALLENGE_WAIT_CONDITION, self.wait)
            .await?;

        if let Some(media) = extract_embedded_payload(&page.html) {
            info!("Payload found in rendered page");
            return Ok(Some(media));
        }

        if is_acknowledged(&page.final_url) {
            debug!(url = %page.final_url, "Challenge acknowledged, fetching directly");
            let final_url = Url::parse(&page.final_url)?;
            let (client, jar) = session(self.timeout)?;
            match &self.cookie {
                Some(cookie) => set_challenge_cookie(&jar, cookie, &final_url),
                None => debug!("No challenge cookie configured, fetching without it"),
            }
            let body = fetch_page(client.get(final_url), DESKTOP_USER_AGENT).await?;
            return Ok(parse_payload(&body));
        }

        Ok(None)
    }
}

#[async_trait]
impl ResolveStrategy for BrowserStrategy {
    fn name(&self) -> &'static str {
        "headless-browser"
    }

    async fn attempt(&self, reference: &SourceReference) -> Option<ResolvedMedia> {
        settle(self.name(), self.run(reference).await)
    }
}

/// Requests the endpoint directly, replaying the challenge cookie when the
/// challenge page is served
pub struct ReplayStrategy {
    endpoint: Url,
    cookie: Option<String>,
    timeout: Duration,
}

impl ReplayStrategy {
    /// Strategy replaying `cookie` as the `__test` value; without a cookie
    /// only direct payload responses are accepted
    #[must_use]
    pub const fn new(endpoint: Url, cookie: Option<String>, timeout: Duration) -> Self {
        Self {
            endpoint,
            cookie,
            timeout,
        }
    }

    async fn run(&self, reference: &SourceReference) -> Result<Option<ResolvedMedia>> {
        let target = endpoint_with_share_url(&self.endpoint, &reference.raw_url);

        let (client, jar) = session(self.timeout)?;
        let body = fetch_page(client.get(target.clone()), DESKTOP_USER_AGENT).await?;
        if serde_json::from_str::<serde_json::Value>(body.trim()).is_ok() {
            return Ok(parse_payload(&body));
        }

        if !is_challenge_page(&body) {
            debug!("Response is neither payload nor challenge page");
            return Ok(None);
        }

        let Some(cookie) = &self.cookie else {
            debug!("Challenge page served but no cookie configured");
            return Ok(None);
        };

        set_challenge_cookie(&jar, cookie, &target);
        let body = fetch_page(client.get(acknowledged(&target)), DESKTOP_USER_AGENT).await?;
        Ok(parse_payload(&body))
    }
}

#[async_trait]
impl ResolveStrategy for ReplayStrategy {
    fn name(&self) -> &'static str {
        "direct-replay"
    }

    async fn attempt(&self, reference: &SourceReference) -> Option<ResolvedMedia> {
        settle(self.name(), self.run(reference).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::SourceKind;
    use crate::testing::ScriptedRenderer;
    use httpmock::prelude::*;
    use httpmock::MockServer;

    const SHARE: &str = "https://terabox.com/s/XYZ";
    const PAYLOAD: &str = r#"{"status":"success","data":[{"name":"movie.mkv","fast_stream_url":"https://cdn.example/movie.mkv","thumbnail":"https://cdn.example/t.jpg","size_formatted":"1.2 GB"}]}"#;
    const CHALLENGE: &str = r#"<html><script src="/aes.js"></script><script>document.cookie="__test="+toHex(slowAES.decrypt(c,2,a,b));location.href="?i=1";</script></html>"#;

    fn reference() -> SourceReference {
        SourceReference::new(SHARE, SourceKind::BulkFile)
    }

    fn expected() -> Option<ResolvedMedia> {
        ResolvedMedia::opaque_file(
            "https://cdn.example/movie.mkv",
            "movie.mkv",
            Some("1.2 GB".to_string()),
            Some("https://cdn.example/t.jpg".to_string()),
        )
    }

    #[test]
    fn test_parse_payload_requires_success() {
        assert_eq!(parse_payload(PAYLOAD), expected());
        assert_eq!(parse_payload(r#"{"status":"error","data":[]}"#), None);
        assert_eq!(parse_payload(r#"{"status":"success","data":[]}"#), None);
        assert_eq!(
            parse_payload(r#"{"status":"success","data":[{"name":"x","fast_stream_url":""}]}"#),
            None
        );
        assert_eq!(parse_payload("not json"), None);
    }

    #[test]
    fn test_parse_payload_defaults_name() {
        let media = parse_payload(r#"{"status":"success","data":[{"fast_stream_url":"https://cdn/f"}]}"#);
        assert_eq!(media.as_ref().map(ResolvedMedia::display_name), Some(DEFAULT_FILE_NAME));
    }

    #[test]
    fn test_embedded_payload_is_entity_decoded() {
        let html = r#"<html><body><pre>{"status":"success","data":[{"name":"a &amp; b.mp4","fast_stream_url":"https://cdn/x?a=1&amp;b=2"}]}</pre></body></html>"#;
        let media = extract_embedded_payload(html);
        assert_eq!(
            media,
            ResolvedMedia::opaque_file("https://cdn/x?a=1&b=2", "a & b.mp4", None, None)
        );
        assert_eq!(extract_embedded_payload("<html>nothing</html>"), None);
    }

    #[test]
    fn test_challenge_fingerprint() {
        assert!(is_challenge_page(CHALLENGE));
        assert!(!is_challenge_page("<html>__test only</html>"));
    }

    #[test]
    fn test_acknowledged_url() -> Result<()> {
        let target = endpoint_with_share_url(&Url::parse("http://e.example/fastbox.php")?, SHARE);
        let ack = acknowledged(&target);
        assert!(is_acknowledged(ack.as_str()));
        assert!(!is_acknowledged(target.as_str()));
        assert!(ack.as_str().ends_with("&i=1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_browser_reads_rendered_payload() -> Result<()> {
        let renderer = Arc::new(ScriptedRenderer::new(
            format!("<html><body><pre>{PAYLOAD}</pre></body></html>"),
            None,
        ));
        let strategy = BrowserStrategy::new(
            renderer.clone(),
            Url::parse("http://e.example/fastbox.php")?,
            None,
            Duration::from_secs(1),
            Duration::from_secs(1),
        );

        assert_eq!(strategy.attempt(&reference()).await, expected());
        let calls = renderer.requested();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("url=https%3A%2F%2Fterabox.com%2Fs%2FXYZ"));
        Ok(())
    }

    async fn serve_gated_endpoint(
        server: &MockServer,
    ) -> (httpmock::Mock<'_>, httpmock::Mock<'_>) {
        let solved = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/fastbox.php")
                    .query_param("i", "1")
                    .header("cookie", "__test=abc123");
                then.status(200).body(PAYLOAD);
            })
            .await;
        let gated = server
            .mock_async(|when, then| {
                when.method(GET).path("/fastbox.php").header_missing("cookie");
                then.status(200).body(CHALLENGE);
            })
            .await;
        (solved, gated)
    }

    fn acknowledged_browser(server: &MockServer, cookie: Option<&str>) -> Result<BrowserStrategy> {
        let final_url = format!("{}?url=x&i=1", server.url("/fastbox.php"));
        let renderer = Arc::new(ScriptedRenderer::new(CHALLENGE.to_string(), Some(final_url)));
        Ok(BrowserStrategy::new(
            renderer,
            Url::parse(&server.url("/fastbox.php"))?,
            cookie.map(str::to_string),
            Duration::from_secs(5),
            Duration::from_secs(1),
        ))
    }

    #[tokio::test]
    async fn test_browser_follows_acknowledged_url_with_cookie() -> Result<()> {
        let server = MockServer::start_async().await;
        let (solved, gated) = serve_gated_endpoint(&server).await;

        let strategy = acknowledged_browser(&server, Some("abc123"))?;
        assert_eq!(strategy.attempt(&reference()).await, expected());
        solved.assert_hits_async(1).await;
        gated.assert_hits_async(0).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_browser_without_cookie_stays_gated() -> Result<()> {
        let server = MockServer::start_async().await;
        let (solved, gated) = serve_gated_endpoint(&server).await;

        let strategy = acknowledged_browser(&server, None)?;
        assert_eq!(strategy.attempt(&reference()).await, None);
        solved.assert_hits_async(0).await;
        gated.assert_hits_async(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_browser_failure_yields_nothing() -> Result<()> {
        let strategy = BrowserStrategy::new(
            Arc::new(ScriptedRenderer::failing()),
            Url::parse("http://e.example/fastbox.php")?,
            None,
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert_eq!(strategy.attempt(&reference()).await, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_replay_accepts_direct_payload() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/fastbox.php").query_param("url", SHARE);
                then.status(200).body(PAYLOAD);
            })
            .await;

        let strategy = ReplayStrategy::new(
            Url::parse(&server.url("/fastbox.php"))?,
            None,
            Duration::from_secs(5),
        );
        assert_eq!(strategy.attempt(&reference()).await, expected());
        mock.assert_hits_async(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_replay_solves_challenge_with_cookie() -> Result<()> {
        let server = MockServer::start_async().await;
        let solved = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/fastbox.php")
                    .query_param("i", "1")
                    .header("cookie", "__test=abc123");
                then.status(200).body(PAYLOAD);
            })
            .await;
        let challenge = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/fastbox.php")
                    .query_param_missing("i");
                then.status(200).body(CHALLENGE);
            })
            .await;

        let strategy = ReplayStrategy::new(
            Url::parse(&server.url("/fastbox.php"))?,
            Some("abc123".to_string()),
            Duration::from_secs(5),
        );
        assert_eq!(strategy.attempt(&reference()).await, expected());
        challenge.assert_hits_async(1).await;
        solved.assert_hits_async(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_replay_without_cookie_gives_up_on_challenge() -> Result<()> {
        let server = MockServer::start_async().await;
        let challenge = server
            .mock_async(|when, then| {
                when.method(GET).path("/fastbox.php");
                then.status(200).body(CHALLENGE);
            })
            .await;

        let strategy = ReplayStrategy::new(
            Url::parse(&server.url("/fastbox.php"))?,
            None,
            Duration::from_secs(5),
        );
        assert_eq!(strategy.attempt(&reference()).await, None);
        challenge.assert_hits_async(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_replay_server_error_yields_nothing() -> Result<()> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/fastbox.php");
                then.status(500);
            })
            .await;

        let strategy = ReplayStrategy::new(
            Url::parse(&server.url("/fastbox.php"))?,
            Some("abc123".to_string()),
            Duration::from_secs(5),
        );
        assert_eq!(strategy.attempt(&reference()).await, None);
        Ok(())
    }
}
