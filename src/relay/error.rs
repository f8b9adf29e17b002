use std::time::Duration;
use thiserror::Error;

/// Why a delivery request was abandoned. Each variant has one fixed
/// user-facing message (see `bot::views`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// The message carried no supported link
    #[error("no supported URL found")]
    NoUrl,
    /// Every resolution strategy came back empty
    #[error("could not resolve the shared link")]
    ResolveFailed,
    /// Transport error, non-success status or timeout while downloading
    #[error("download failed")]
    DownloadFailed,
    /// The staged file exceeds the size cap
    #[error("file too large: {size} bytes (limit {limit})")]
    TooLarge {
        /// Actual staged size
        size: u64,
        /// Configured cap
        limit: u64,
    },
    /// Upload budget exhausted or a non-retryable send fault
    #[error("upload failed")]
    UploadFailed,
}

/// The resolver found nothing usable for a reference
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("all {attempted} resolution strategies yielded nothing")]
pub struct ResolveFailure {
    /// Number of strategies tried
    pub attempted: usize,
}

/// Download failures. None of them are retried inside the engine.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Source answered with a non-success status
    #[error("source returned HTTP {0}")]
    Status(reqwest::StatusCode),
    /// Connection or body read failed
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The attempt exceeded its wall-clock budget
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
    /// Writing the staging file failed
    #[error("staging I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How the delivery channel rejected a send
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The channel asks the caller to wait before retrying
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),
    /// Network-level fault worth retrying
    #[error("transient relay fault: {0}")]
    Transient(String),
    /// Anything else; never retried
    #[error("send rejected: {0}")]
    Fatal(String),
}

/// Upload failures after the retry policy gave up
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// Every attempt hit a transient fault
    #[error("upload failed after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts consumed
        attempts: usize,
        /// Last transient fault
        last: String,
    },
    /// A non-retryable fault
    #[error("upload rejected: {0}")]
    Rejected(String),
}
