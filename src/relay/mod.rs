//! Content acquisition and relay pipeline.
//!
//! Text is classified into [`SourceReference`]s, one reference is resolved to
//! [`ResolvedMedia`], and each fetch location is streamed through a staging
//! file to the delivery channel. [`orchestrator::Orchestrator`] drives one
//! [`DeliveryRequest`] through these stages.

/// Free-text URL classification
pub mod classifier;
/// Error taxonomy for the pipeline
pub mod error;
/// Per-request state machine
pub mod orchestrator;
/// Share URL resolution strategies
pub mod resolver;
/// Transient staging files
pub mod staging;
/// Status reporting abstraction
pub mod status;
/// Download and upload engine
pub mod transfer;

pub use error::FailureReason;

use std::path::PathBuf;

/// Hosting provider behind a share link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// instagram.com
    Instagram,
    /// terabox.com / 1024tera.com
    Terabox,
}

/// What kind of content a share link points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Short-form video (`/reel/`)
    ReelLike,
    /// Post that may hold a video or a photo set (`/p/`)
    MixedPost,
    /// File behind a challenge-gated share link
    BulkFile,
}

impl SourceKind {
    /// Processing priority when a message carries several kinds (lower wins)
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::ReelLike | Self::MixedPost => 0,
            Self::BulkFile => 1,
        }
    }

    /// Provider serving this kind of link
    #[must_use]
    pub const fn provider(self) -> Provider {
        match self {
            Self::ReelLike | Self::MixedPost => Provider::Instagram,
            Self::BulkFile => Provider::Terabox,
        }
    }
}

/// A typed reference extracted from user text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReference {
    /// The matched URL exactly as it appeared in the text
    pub raw_url: String,
    /// Kind of content
    pub source_kind: SourceKind,
    /// Hosting provider
    pub provider: Provider,
}

impl SourceReference {
    /// Create a reference; the provider follows from the kind
    #[must_use]
    pub fn new(raw_url: impl Into<String>, source_kind: SourceKind) -> Self {
        Self {
            raw_url: raw_url.into(),
            source_kind,
            provider: source_kind.provider(),
        }
    }
}

/// Normalized result of resolving a share link.
///
/// Constructors refuse empty locations, so a value of this type always has at
/// least one fetch location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedMedia {
    /// One playable video
    SingleVideo {
        /// Direct video location
        location: String,
        /// Preview image, if the page exposed one
        thumbnail: Option<String>,
    },
    /// Images at a single resolution tier, in page order
    PhotoSet {
        /// Direct image locations
        locations: Vec<String>,
    },
    /// Arbitrary file from the challenge-gated provider
    OpaqueFile {
        /// Direct file location
        location: String,
        /// File name reported by the provider
        display_name: String,
        /// Human-readable size; byte-exact size is never reported
        declared_size: Option<String>,
        /// Preview image
        thumbnail: Option<String>,
    },
}

impl ResolvedMedia {
    /// A single video, or `None` when the location is blank
    #[must_use]
    pub fn single_video(location: impl Into<String>, thumbnail: Option<String>) -> Option<Self> {
        let location = location.into();
        if location.trim().is_empty() {
            return None;
        }
        Some(Self::SingleVideo {
            location,
            thumbnail: thumbnail.filter(|t| !t.trim().is_empty()),
        })
    }

    /// A photo set, or `None` when no usable location remains
    #[must_use]
    pub fn photo_set(locations: Vec<String>) -> Option<Self> {
        let locations: Vec<String> = locations
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .collect();
        if locations.is_empty() {
            return None;
        }
        Some(Self::PhotoSet { locations })
    }

    /// An opaque file, or `None` when the location is blank
    #[must_use]
    pub fn opaque_file(
        location: impl Into<String>,
        display_name: impl Into<String>,
        declared_size: Option<String>,
        thumbnail: Option<String>,
    ) -> Option<Self> {
        let location = location.into();
        if location.trim().is_empty() {
            return None;
        }
        Some(Self::OpaqueFile {
            location,
            display_name: display_name.into(),
            declared_size: declared_size.filter(|s| !s.trim().is_empty()),
            thumbnail: thumbnail.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Fetch locations in delivery order
    #[must_use]
    pub fn fetch_locations(&self) -> Vec<&str> {
        match self {
            Self::SingleVideo { location, .. } | Self::OpaqueFile { location, .. } => {
                vec![location.as_str()]
            }
            Self::PhotoSet { locations } => locations.iter().map(String::as_str).collect(),
        }
    }

    /// Name shown to the user
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Self::SingleVideo { .. } => "video",
            Self::PhotoSet { .. } => "photos",
            Self::OpaqueFile { display_name, .. } => display_name,
        }
    }

    /// Size as reported by the provider, if any
    #[must_use]
    pub fn declared_size(&self) -> Option<&str> {
        match self {
            Self::OpaqueFile { declared_size, .. } => declared_size.as_deref(),
            Self::SingleVideo { .. } | Self::PhotoSet { .. } => None,
        }
    }

    /// Preview image, if any
    #[must_use]
    pub fn thumbnail(&self) -> Option<&str> {
        match self {
            Self::SingleVideo { thumbnail, .. } | Self::OpaqueFile { thumbnail, .. } => {
                thumbnail.as_deref()
            }
            Self::PhotoSet { .. } => None,
        }
    }
}

/// Lifecycle of one [`TransferJob`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Created, no bytes moved yet
    Pending,
    /// Bytes are moving
    InFlight,
    /// All bytes written
    Complete,
    /// Transfer aborted
    Failed,
}

/// Bookkeeping for one file transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    /// Where the bytes are staged
    pub staging_path: PathBuf,
    /// Content length reported by the source, if any
    pub expected_bytes: Option<u64>,
    /// Bytes written so far
    pub transferred_bytes: u64,
    /// Current status
    pub status: JobStatus,
}

impl TransferJob {
    /// A pending job targeting `staging_path`
    #[must_use]
    pub const fn new(staging_path: PathBuf) -> Self {
        Self {
            staging_path,
            expected_bytes: None,
            transferred_bytes: 0,
            status: JobStatus::Pending,
        }
    }
}

/// Where a [`DeliveryRequest`] is in the pipeline.
///
/// Per-file stages carry the zero-based file index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Message received
    Queued,
    /// Text scanned for references
    Classified,
    /// Resolver running
    Resolving,
    /// Fetch locations known
    Resolved,
    /// File `n` streaming to staging
    Downloading(usize),
    /// File `n` fully staged
    Downloaded(usize),
    /// File `n` checked against the size cap
    Validating(usize),
    /// File `n` being sent to the channel
    Uploading(usize),
    /// All files delivered
    Delivered,
    /// Abandoned
    Failed(FailureReason),
}

impl Stage {
    /// Terminal stages accept no further transitions
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed(_))
    }

    fn order_key(&self) -> (u8, usize, u8) {
        match self {
            Self::Queued => (0, 0, 0),
            Self::Classified => (1, 0, 0),
            Self::Resolving => (2, 0, 0),
            Self::Resolved => (3, 0, 0),
            Self::Downloading(i) => (4, *i, 0),
            Self::Downloaded(i) => (4, *i, 1),
            Self::Validating(i) => (4, *i, 2),
            Self::Uploading(i) => (4, *i, 3),
            Self::Delivered | Self::Failed(_) => (5, 0, 0),
        }
    }

    /// Whether moving from `self` to `next` keeps the pipeline strictly forward
    #[must_use]
    pub fn can_advance_to(&self, next: &Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(next, Self::Failed(_)) || next.order_key() > self.order_key()
    }
}

/// Everything the orchestrator knows about one incoming message
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// The reference being processed
    pub reference: Option<SourceReference>,
    /// Resolution result
    pub media: Option<ResolvedMedia>,
    /// One job per fetch location attempted so far
    pub jobs: Vec<TransferJob>,
    /// Current stage
    pub stage: Stage,
}

impl DeliveryRequest {
    /// A fresh request in [`Stage::Queued`]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reference: None,
            media: None,
            jobs: Vec::new(),
            stage: Stage::Queued,
        }
    }

    /// The failure reason, if the request ended in [`Stage::Failed`]
    #[must_use]
    pub const fn failure(&self) -> Option<&FailureReason> {
        match &self.stage {
            Stage::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Whether more than one job is in flight
    #[must_use]
    pub fn has_concurrent_jobs(&self) -> bool {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::InFlight)
            .count()
            > 1
    }
}

impl Default for DeliveryRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_media_is_unrepresentable() {
        assert!(ResolvedMedia::single_video("", None).is_none());
        assert!(ResolvedMedia::photo_set(vec![]).is_none());
        assert!(ResolvedMedia::photo_set(vec![" ".to_string()]).is_none());
        assert!(ResolvedMedia::opaque_file("", "a.mp4", None, None).is_none());
    }

    #[test]
    fn photo_set_keeps_order() {
        let media = ResolvedMedia::photo_set(vec!["a".into(), String::new(), "b".into()]);
        let Some(media) = media else {
            panic!("expected photo set");
        };
        assert_eq!(media.fetch_locations(), vec!["a", "b"]);
        assert_eq!(media.declared_size(), None);
    }

    #[test]
    fn opaque_file_drops_blank_metadata() {
        let media = ResolvedMedia::opaque_file("https://x/f", "f.zip", Some(String::new()), None);
        let Some(media) = media else {
            panic!("expected opaque file");
        };
        assert_eq!(media.display_name(), "f.zip");
        assert_eq!(media.declared_size(), None);
        assert_eq!(media.thumbnail(), None);
    }

    #[test]
    fn request_reports_failure_and_in_flight_jobs() {
        let mut request = DeliveryRequest::new();
        assert_eq!(request.failure(), None);

        let mut first = TransferJob::new(PathBuf::from("a.jpg"));
        first.status = JobStatus::Complete;
        let mut second = TransferJob::new(PathBuf::from("b.jpg"));
        second.status = JobStatus::InFlight;
        request.jobs = vec![first, second];
        assert!(!request.has_concurrent_jobs());

        request.jobs[0].status = JobStatus::InFlight;
        assert!(request.has_concurrent_jobs());

        request.stage = Stage::Failed(FailureReason::UploadFailed);
        assert_eq!(request.failure(), Some(&FailureReason::UploadFailed));
    }

    #[test]
    fn stages_only_move_forward() {
        assert!(Stage::Queued.can_advance_to(&Stage::Classified));
        assert!(Stage::Resolved.can_advance_to(&Stage::Downloading(0)));
        assert!(Stage::Uploading(0).can_advance_to(&Stage::Downloading(1)));
        assert!(Stage::Uploading(2).can_advance_to(&Stage::Delivered));
        assert!(!Stage::Resolving.can_advance_to(&Stage::Classified));
        assert!(!Stage::Uploading(1).can_advance_to(&Stage::Downloading(0)));
        assert!(!Stage::Downloading(0).can_advance_to(&Stage::Downloading(0)));
    }

    #[test]
    fn failure_reachable_from_any_non_terminal_stage() {
        let failed = Stage::Failed(FailureReason::NoUrl);
        for stage in [
            Stage::Queued,
            Stage::Classified,
            Stage::Resolving,
            Stage::Resolved,
            Stage::Downloading(3),
            Stage::Validating(0),
            Stage::Uploading(1),
        ] {
            assert!(stage.can_advance_to(&failed), "{stage:?}");
        }
        assert!(!Stage::Delivered.can_advance_to(&failed));
        assert!(!failed.can_advance_to(&Stage::Delivered));
    }

    #[test]
    fn kind_priority_prefers_instagram() {
        assert!(SourceKind::ReelLike.priority() < SourceKind::BulkFile.priority());
        assert_eq!(SourceKind::MixedPost.provider(), Provider::Instagram);
        assert_eq!(SourceKind::BulkFile.provider(), Provider::Terabox);
    }
}
