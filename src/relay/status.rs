//! Status reporting for one delivery request.
//!
//! The orchestrator describes what is happening with [`StatusUpdate`] values;
//! a [`StatusChannel`] renders them into a single message that is edited in
//! place and removed once delivery succeeds.

use super::{FailureReason, Provider};
use anyhow::Result;
use async_trait::async_trait;

/// A user-visible status change
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// A link was recognised and is being resolved
    Processing {
        /// Provider being contacted
        provider: Provider,
    },
    /// A file download started
    Downloading {
        /// File name or kind shown to the user
        name: String,
        /// Provider-reported size, if known
        declared_size: Option<String>,
        /// One-based file number
        index: usize,
        /// Total number of files
        total: usize,
    },
    /// Download progress sample
    Progress {
        /// Percentage of the reported content length
        percent: f64,
        /// Bytes written so far
        transferred: u64,
        /// Reported content length
        total: u64,
    },
    /// The staged file is being sent
    Uploading {
        /// One-based file number
        index: usize,
        /// Total number of files
        total: usize,
    },
    /// The request was abandoned
    Failed(FailureReason),
}

/// Handle to the single status message of a request
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusChannel: Send + Sync {
    /// Show `update`, replacing the previous status.
    ///
    /// # Errors
    ///
    /// Returns an error if the status message could not be written.
    async fn update(&self, update: &StatusUpdate) -> Result<()>;

    /// Remove the status message after a successful delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the status message could not be removed.
    async fn clear(&self) -> Result<()>;
}
