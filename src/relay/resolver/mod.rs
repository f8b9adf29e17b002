//! Share URL resolution.
//!
//! Every source kind is bound to a [`StrategyChain`]: an ordered list of
//! [`ResolveStrategy`] implementations tried until one yields media.
//!
//! Failure contract: a strategy never surfaces transport errors, non-success
//! statuses or unparsable responses. Each of those means exactly one thing,
//! "this strategy produced nothing", and the chain moves on. The resolver
//! itself never retries a provider.

/// Challenge-gated provider strategies
pub mod challenge;
/// Rendering sidecar client
pub mod render;
/// Scrape-based provider strategies
pub mod scrape;

use super::error::ResolveFailure;
use super::{ResolvedMedia, SourceKind, SourceReference};
use crate::config::Settings;
use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use challenge::{BrowserStrategy, ReplayStrategy};
use render::Crawl4aiRenderer;
use scrape::{PhotoScrapeStrategy, VideoScrapeStrategy};

/// One way of turning a reference into media
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Try to resolve `reference`; `None` means this strategy produced nothing.
    async fn attempt(&self, reference: &SourceReference) -> Option<ResolvedMedia>;
}

/// Converts a strategy's internal result into the chain contract, logging
/// whatever is swallowed.
pub(crate) fn settle(strategy: &str, outcome: Result<Option<ResolvedMedia>>) -> Option<ResolvedMedia> {
    match outcome {
        Ok(Some(media)) => Some(media),
        Ok(None) => {
            debug!(strategy, "Strategy produced nothing");
            None
        }
        Err(e) => {
            warn!(strategy, error = %e, "Strategy failed, treating as empty");
            None
        }
    }
}

/// Ordered strategies, short-circuiting on the first success
pub struct StrategyChain {
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl StrategyChain {
    /// Build a chain tried in the given order
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn ResolveStrategy>>) -> Self {
        Self { strategies }
    }

    /// Names of the strategies, in order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the chain.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveFailure`] when every strategy yields nothing.
    pub async fn resolve(
        &self,
        reference: &SourceReference,
    ) -> Result<ResolvedMedia, ResolveFailure> {
        for strategy in &self.strategies {
            info!(strategy = strategy.name(), url = %reference.raw_url, "Trying resolution strategy");
            if let Some(media) = strategy.attempt(reference).await {
                info!(strategy = strategy.name(), "Resolution strategy succeeded");
                return Ok(media);
            }
        }

        warn!(url = %reference.raw_url, "All resolution strategies failed");
        Err(ResolveFailure {
            attempted: self.strategies.len(),
        })
    }
}

/// Maps each source kind to its strategy chain
pub struct Resolver {
    challenge: StrategyChain,
    scrape: StrategyChain,
}

impl Resolver {
    /// Resolver with explicit chains for the challenge-gated and scrape-based
    /// providers
    #[must_use]
    pub const fn new(challenge: StrategyChain, scrape: StrategyChain) -> Self {
        Self { challenge, scrape }
    }

    /// Production chains built from settings.
    ///
    /// The browser strategy is only included when a rendering sidecar is
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured endpoint is not a valid URL.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = settings.resolve_timeout();
        let client = create_http_client(timeout);
        let challenge_endpoint = Url::parse(&settings.challenge_endpoint)?;

        let mut challenge: Vec<Box<dyn ResolveStrategy>> = Vec::new();
        if let Some(renderer_url) = &settings.renderer_url {
            let renderer = Crawl4aiRenderer::new(renderer_url, settings.challenge_wait() + timeout);
            challenge.push(Box::new(BrowserStrategy::new(
                Arc::new(renderer),
                challenge_endpoint.clone(),
                settings.challenge_cookie.clone(),
                timeout,
                settings.challenge_wait(),
            )));
        } else {
            warn!("RENDERER_URL not set, browser challenge strategy disabled");
        }
        challenge.push(Box::new(ReplayStrategy::new(
            challenge_endpoint,
            settings.challenge_cookie.clone(),
            timeout,
        )));

        let scrape: Vec<Box<dyn ResolveStrategy>> = vec![
            Box::new(VideoScrapeStrategy::new(
                client.clone(),
                Url::parse(&settings.reel_endpoint)?,
            )),
            Box::new(PhotoScrapeStrategy::new(
                client,
                Url::parse(&settings.photo_endpoint)?,
            )),
        ];

        Ok(Self::new(
            StrategyChain::new(challenge),
            StrategyChain::new(scrape),
        ))
    }

    /// Resolve `reference` with the chain bound to its kind.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveFailure`] when the chain is exhausted.
    pub async fn resolve(
        &self,
        reference: &SourceReference,
    ) -> Result<ResolvedMedia, ResolveFailure> {
        match reference.source_kind {
            SourceKind::BulkFile => self.challenge.resolve(reference).await,
            SourceKind::ReelLike | SourceKind::MixedPost => self.scrape.resolve(reference).await,
        }
    }
}

/// Creates an HTTP client with the resolver timeout.
#[must_use]
pub fn create_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// `endpoint?url=<share url>`
pub(crate) fn endpoint_with_share_url(endpoint: &Url, share_url: &str) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut().append_pair("url", share_url);
    url
}

/// GET `url` and return the body of a successful response.
pub(crate) async fn fetch_page(
    request: reqwest::RequestBuilder,
    user_agent: &str,
) -> Result<String> {
    let response = request.header(USER_AGENT, user_agent).send().await?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        bail!(format_http_error(status, &text));
    }

    Ok(response.text().await?)
}

pub(crate) fn format_http_error(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim_start();
    let is_html = trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<HTML");

    if is_html {
        return format!("endpoint error: {status} (HTML error page)");
    }

    let message = crate::utils::truncate_str(trimmed, 200);
    if message.is_empty() {
        format!("endpoint error: {status}")
    } else {
        format!("endpoint error: {status} - {message}")
    }
}
