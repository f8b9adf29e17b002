//! Strategies for the scrape-based short-form provider.
//!
//! Both strategies fetch a third-party download page for the share URL and
//! pull direct locations out of its anchors.

#![allow(clippy::non_std_lazy_statics)]

use super::{endpoint_with_share_url, fetch_page, settle, ResolveStrategy};
use crate::config::{DESKTOP_USER_AGENT, MOBILE_USER_AGENT};
use crate::relay::{ResolvedMedia, SourceKind, SourceReference};
use crate::utils::decode_entities;
use anyhow::Result;
use async_trait::async_trait;
use lazy_regex::lazy_regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL};
use reqwest::Url;
use tracing::debug;

/// Photo resolution tiers, best first
pub const PHOTO_TIERS: &[&str] = &["1080 x 1080", "750 x 750", "640 x 640"];

static RE_VIDEO_ANCHOR: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r#"<a[^>]+href="([^"]+\.mp4[^"]*)"[^>]*>"#);
static RE_THUMBNAIL_ANCHOR: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r#"<a[^>]+href="([^"]+\.jpg[^"]*)"[^>]*>"#);
static RE_ANCHOR: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r#"(?is)<a\b([^>]*)>(.*?)</a>"#);
static RE_CLASS_ATTR: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r#"(?i)\bclass\s*=\s*["']([^"']*)["']"#);
static RE_HREF_ATTR: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r#"(?i)\bhref\s*=\s*["']([^"']*)["']"#);
static RE_TAG: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"<[^>]*>");

fn first_anchor_href(re: &regex::Regex, html: &str) -> Option<String> {
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| decode_entities(m.as_str()))
}

/// A download anchor: decoded href plus visible text
#[derive(Debug, PartialEq, Eq)]
struct DownloadAnchor {
    href: String,
    text: String,
}

/// Anchors whose class list mentions `btn-download`, in page order
fn download_anchors(html: &str) -> Vec<DownloadAnchor> {
    RE_ANCHOR
        .captures_iter(html)
        .filter_map(|caps| {
            let attrs = caps.get(1)?.as_str();
            let class = RE_CLASS_ATTR.captures(attrs)?.get(1)?.as_str();
            if !class.contains("btn-download") {
                return None;
            }
            let href = decode_entities(RE_HREF_ATTR.captures(attrs)?.get(1)?.as_str());
            if href.is_empty() {
                return None;
            }
            let inner = caps.get(2).map_or("", |m| m.as_str());
            let text = decode_entities(RE_TAG.replace_all(inner, "").trim());
            Some(DownloadAnchor { href, text })
        })
        .collect()
}

/// Links at the best tier that has any
fn best_tier_links(anchors: &[DownloadAnchor]) -> Vec<String> {
    for tier in PHOTO_TIERS {
        let label = format!("Download ({tier})");
        let compact = tier.replace(" x ", "x");
        let links: Vec<String> = anchors
            .iter()
            .filter(|a| a.text.contains(&label) || a.href.contains(&compact))
            .map(|a| a.href.clone())
            .collect();
        if !links.is_empty() {
            debug!(tier, count = links.len(), "Photo tier selected");
            return links;
        }
    }
    Vec::new()
}

/// Finds the first video anchor on the reel download page
pub struct VideoScrapeStrategy {
    client: reqwest::Client,
    endpoint: Url,
}

impl VideoScrapeStrategy {
    /// Strategy scraping `endpoint`
    #[must_use]
    pub const fn new(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    async fn run(&self, reference: &SourceReference) -> Result<Option<ResolvedMedia>> {
        let url = endpoint_with_share_url(&self.endpoint, &reference.raw_url);
        let html = fetch_page(self.client.get(url), DESKTOP_USER_AGENT).await?;

        let Some(video) = first_anchor_href(&RE_VIDEO_ANCHOR, &html) else {
            return Ok(None);
        };
        let thumbnail = first_anchor_href(&RE_THUMBNAIL_ANCHOR, &html);
        Ok(ResolvedMedia::single_video(video, thumbnail))
    }
}

#[async_trait]
impl ResolveStrategy for VideoScrapeStrategy {
    fn name(&self) -> &'static str {
        "video-scrape"
    }

    async fn attempt(&self, reference: &SourceReference) -> Option<ResolvedMedia> {
        settle(self.name(), self.run(reference).await)
    }
}

/// Collects photo download links for mixed posts
pub struct PhotoScrapeStrategy {
    client: reqwest::Client,
    endpoint: Url,
}

impl PhotoScrapeStrategy {
    /// Strategy scraping `endpoint`
    #[must_use]
    pub const fn new(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    async fn run(&self, reference: &SourceReference) -> Result<Option<ResolvedMedia>> {
        if reference.source_kind != SourceKind::MixedPost {
            return Ok(None);
        }

        let url = endpoint_with_share_url(&self.endpoint, &reference.raw_url);
        let request = self
            .client
            .get(url)
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            )
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(CACHE_CONTROL, "no-cache");
        let html = fetch_page(request, MOBILE_USER_AGENT).await?;

        Ok(ResolvedMedia::photo_set(best_tier_links(&download_anchors(&html))))
    }
}

#[async_trait]
impl ResolveStrategy for PhotoScrapeStrategy {
    fn name(&self) -> &'static str {
        "photo-scrape"
    }

    async fn attempt(&self, reference: &SourceReference) -> Option<ResolvedMedia> {
        settle(self.name(), self.run(reference).await)
    }
}
