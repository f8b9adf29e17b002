//! Free-text URL classification.
//!
//! All source patterns live in one alternation so a single left-to-right scan
//! yields non-overlapping matches in order of first appearance.

#![allow(clippy::non_std_lazy_statics)]

use super::{SourceKind, SourceReference};
use lazy_regex::lazy_regex;

/// Supported share links, one named group per kind
static RE_SOURCE_URL: lazy_regex::Lazy<regex::Regex> = lazy_regex!(
    r"(?P<reel>https?://(?:www\.)?instagram\.com/reel/[A-Za-z0-9_-]+/?)|(?P<post>https?://(?:www\.)?instagram\.com/p/[A-Za-z0-9_-]+/?)|(?P<bulk>https?://(?:www\.)?(?:terabox\.com/s/[A-Za-z0-9_-]+/?|terabox\.com/sharing/link\?surl=[A-Za-z0-9_-]+|1024tera\.com/s/[A-Za-z0-9_-]+/?))"
);

/// Extract every supported reference from `text`, in order of appearance.
///
/// Unmatched text is ignored.
///
/// # Examples
///
/// ```
/// use oxide_relay::relay::classifier::classify;
/// use oxide_relay::relay::SourceKind;
///
/// let refs = classify("see https://www.instagram.com/p/Cx1_y/ and https://1024tera.com/s/abc");
/// assert_eq!(refs.len(), 2);
/// assert_eq!(refs[0].source_kind, SourceKind::MixedPost);
/// assert_eq!(refs[1].source_kind, SourceKind::BulkFile);
/// ```
#[must_use]
pub fn classify(text: &str) -> Vec<SourceReference> {
    RE_SOURCE_URL
        .captures_iter(text)
        .filter_map(|caps| {
            let (kind, m) = if let Some(m) = caps.name("reel") {
                (SourceKind::ReelLike, m)
            } else if let Some(m) = caps.name("post") {
                (SourceKind::MixedPost, m)
            } else {
                (SourceKind::BulkFile, caps.name("bulk")?)
            };
            Some(SourceReference::new(m.as_str(), kind))
        })
        .collect()
}

/// Pick the one reference a message is processed for: the first reference of
/// the highest-priority kind.
#[must_use]
pub fn select_primary(references: &[SourceReference]) -> Option<&SourceReference> {
    references
        .iter()
        .min_by_key(|r| r.source_kind.priority())
}
