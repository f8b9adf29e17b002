//! Transfer engine: streaming downloads into staging and retrying uploads to
//! the delivery channel.
//!
//! Downloads are never retried here. Uploads follow a fixed policy: transient
//! relay faults consume the retry budget and back off, rate-limit signals are
//! obeyed without consuming it, anything else is terminal.

use super::error::{DownloadError, SendError, UploadError};
use super::status::{StatusChannel, StatusUpdate};
use super::{JobStatus, TransferJob};
use crate::config::{DOWNLOAD_BUFFER_SIZE, PROGRESS_STEP_PERCENT};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

/// Extensions delivered as native video
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm"];

/// How an attachment is presented in the chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// Native video message
    Video,
    /// Native photo message
    Photo,
    /// Generic file
    Document,
}

impl AttachmentKind {
    /// Video for known video extensions, otherwise document
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        let is_video = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()));
        if is_video {
            Self::Video
        } else {
            Self::Document
        }
    }
}

/// A staged file ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Staged file
    pub path: PathBuf,
    /// Presentation
    pub kind: AttachmentKind,
    /// Caption carrying the original link
    pub caption: String,
}

/// The delivery channel's attachment-sending capability
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Send one attachment.
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] classifying the failure for the retry policy.
    async fn send(&self, attachment: &Attachment) -> Result<(), SendError>;
}

/// Upload retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Attempts allowed for transient faults
    pub max_attempts: usize,
    /// Pause after a transient fault
    pub backoff: Duration,
}

/// Outcome of a successful upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    /// Retry budget consumed, including the successful attempt
    pub attempts: usize,
    /// Rate-limit waits obeyed
    pub rate_limited: usize,
}

/// Emits a progress update each time another 10 points are crossed
#[derive(Debug)]
struct ProgressSampler {
    total: Option<u64>,
    last_reported: f64,
}

impl ProgressSampler {
    const fn new(total: Option<u64>) -> Self {
        Self {
            total,
            last_reported: 0.0,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn sample(&mut self, transferred: u64) -> Option<StatusUpdate> {
        let total = self.total?;
        let percent = transferred as f64 * 100.0 / total as f64;
        if percent - self.last_reported < PROGRESS_STEP_PERCENT {
            return None;
        }
        self.last_reported = percent;
        Some(StatusUpdate::Progress {
            percent,
            transferred,
            total,
        })
    }
}

/// Streams bytes into staging and out to the delivery channel
#[derive(Debug, Clone)]
pub struct TransferEngine {
    client: reqwest::Client,
    download_timeout: Duration,
    policy: UploadPolicy,
}

impl TransferEngine {
    /// Create an engine with the given download budget and upload policy
    #[must_use]
    pub fn new(download_timeout: Duration, policy: UploadPolicy) -> Self {
        let client = reqwest::Client::builder()
            .timeout(download_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            download_timeout,
            policy,
        }
    }

    /// Stream `url` into `job.staging_path`.
    ///
    /// Progress is reported to `status` only when the source declares a
    /// content length; failed progress updates are ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadError`] on non-success status, transport failure,
    /// staging I/O failure or when the attempt exceeds its time budget.
    pub async fn download(
        &self,
        url: &str,
        job: &mut TransferJob,
        status: &dyn StatusChannel,
    ) -> Result<(), DownloadError> {
        job.status = JobStatus::InFlight;
        debug!(url = %url, path = %job.staging_path.display(), "Download started");

        let result = match tokio::time::timeout(
            self.download_timeout,
            self.stream_to_file(url, job, status),
        )
        .await
        {
            Ok(inner) => inner,
            Err(_) => Err(DownloadError::Timeout(self.download_timeout)),
        };

        match &result {
            Ok(()) => {
                job.status = JobStatus::Complete;
                info!(
                    bytes = job.transferred_bytes,
                    expected = ?job.expected_bytes,
                    "Download complete"
                );
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                warn!(url = %url, error = %e, "Download failed");
            }
        }
        result
    }

    async fn stream_to_file(
        &self,
        url: &str,
        job: &mut TransferJob,
        status: &dyn StatusChannel,
    ) -> Result<(), DownloadError> {
        let response = self.client.get(url).send().await?;

        let code = response.status();
        if !code.is_success() {
            return Err(DownloadError::Status(code));
        }

        let total = response.content_length().filter(|len| *len > 0);
        job.expected_bytes = total;

        let reader = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
        tokio::pin!(reader);

        let mut file = tokio::fs::File::create(&job.staging_path).await?;
        let mut buffer = vec![0u8; DOWNLOAD_BUFFER_SIZE];
        let mut sampler = ProgressSampler::new(total);

        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read]).await?;
            job.transferred_bytes += read as u64;

            if let Some(update) = sampler.sample(job.transferred_bytes) {
                if let Err(e) = status.update(&update).await {
                    debug!(error = %e, "Progress update skipped");
                }
            }
        }

        file.flush().await?;
        Ok(())
    }

    /// Send `attachment`, retrying per the upload policy.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Exhausted`] when every attempt hit a transient
    /// fault, or [`UploadError::Rejected`] on the first non-retryable fault.
    pub async fn upload(
        &self,
        channel: &dyn DeliveryChannel,
        attachment: &Attachment,
    ) -> Result<UploadReport, UploadError> {
        let mut attempts = 0;
        let mut rate_limited = 0;

        loop {
            attempts += 1;
            match channel.send(attachment).await {
                Ok(()) => {
                    info!(
                        path = %attachment.path.display(),
                        kind = ?attachment.kind,
                        attempts,
                        "Upload delivered"
                    );
                    return Ok(UploadReport {
                        attempts,
                        rate_limited,
                    });
                }
                Err(SendError::RateLimited(wait)) => {
                    // Scheduling instruction, not a fault: the attempt is repeated
                    attempts -= 1;
                    rate_limited += 1;
                    warn!(wait_secs = wait.as_secs_f64(), "Upload rate limited, waiting");
                    tokio::time::sleep(wait).await;
                }
                Err(SendError::Transient(e)) => {
                    if attempts >= self.policy.max_attempts {
                        warn!(attempts, error = %e, "Upload retry budget exhausted");
                        return Err(UploadError::Exhausted { attempts, last: e });
                    }
                    warn!(
                        attempt = attempts,
                        max = self.policy.max_attempts,
                        error = %e,
                        "Transient upload fault, backing off"
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                }
                Err(SendError::Fatal(e)) => {
                    warn!(error = %e, "Upload rejected");
                    return Err(UploadError::Rejected(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::status::MockStatusChannel;
    use crate::testing::{RecordingStatus, ScriptedChannel};
    use httpmock::prelude::*;
    use httpmock::MockServer;
    use std::time::Instant;

    fn engine(max_attempts: usize, backoff_ms: u64) -> TransferEngine {
        TransferEngine::new(
            Duration::from_secs(5),
            UploadPolicy {
                max_attempts,
                backoff: Duration::from_millis(backoff_ms),
            },
        )
    }

    fn attachment() -> Attachment {
        Attachment {
            path: PathBuf::from("/tmp/clip.mp4"),
            kind: AttachmentKind::Video,
            caption: "🔗 Original URL: https://instagram.com/reel/A".to_string(),
        }
    }

    #[test]
    fn test_attachment_kind_by_extension() {
        assert_eq!(AttachmentKind::for_path(Path::new("a/b.MP4")), AttachmentKind::Video);
        assert_eq!(AttachmentKind::for_path(Path::new("b.webm")), AttachmentKind::Video);
        assert_eq!(AttachmentKind::for_path(Path::new("b.zip")), AttachmentKind::Document);
        assert_eq!(AttachmentKind::for_path(Path::new("b")), AttachmentKind::Document);
    }

    #[test]
    fn test_progress_sampler_steps_by_ten_points() {
        let mut sampler = ProgressSampler::new(Some(1000));
        let reported: Vec<u64> = (1..=100)
            .map(|i| i * 10)
            .filter(|t| sampler.sample(*t).is_some())
            .collect();
        assert_eq!(
            reported,
            vec![100, 200, 300, 400, 500, 600, 700, 800, 900, 1000]
        );
    }

    #[test]
    fn test_progress_sampler_without_length_is_silent() {
        let mut sampler = ProgressSampler::new(None);
        assert!(sampler.sample(10_000).is_none());
    }

    #[tokio::test]
    async fn test_download_streams_body_and_reports_progress() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let body = vec![7u8; 100_000];
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v.mp4");
                then.status(200).body(body.clone());
            })
            .await;

        let dir = tempfile::tempdir()?;
        let mut job = TransferJob::new(dir.path().join("v.mp4"));
        let status = RecordingStatus::default();

        engine(3, 1)
            .download(&server.url("/v.mp4"), &mut job, &status)
            .await?;

        assert_eq!(job.status, JobStatus::Complete);
        assert_eq!(job.transferred_bytes, 100_000);
        assert_eq!(job.expected_bytes, Some(100_000));
        assert_eq!(tokio::fs::read(&job.staging_path).await?, body);

        let progress = status.progress_count();
        assert!((1..=10).contains(&progress), "progress updates: {progress}");
        Ok(())
    }

    #[tokio::test]
    async fn test_download_non_success_status_fails_immediately() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/gone");
                then.status(404);
            })
            .await;

        let dir = tempfile::tempdir()?;
        let mut job = TransferJob::new(dir.path().join("gone.mp4"));
        let result = engine(3, 1)
            .download(&server.url("/gone"), &mut job, &RecordingStatus::default())
            .await;

        assert!(matches!(result, Err(DownloadError::Status(code)) if code.as_u16() == 404));
        assert_eq!(job.status, JobStatus::Failed);
        mock.assert_hits_async(1).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_download_survives_failing_status_updates() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/f.bin");
                then.status(200).body(vec![1u8; 50_000]);
            })
            .await;

        let mut status = MockStatusChannel::new();
        status
            .expect_update()
            .returning(|_| Err(anyhow::anyhow!("message to edit not found")));

        let dir = tempfile::tempdir()?;
        let mut job = TransferJob::new(dir.path().join("f.bin"));
        engine(3, 1)
            .download(&server.url("/f.bin"), &mut job, &status)
            .await?;

        assert_eq!(job.status, JobStatus::Complete);
        assert_eq!(job.transferred_bytes, 50_000);
        Ok(())
    }

    #[tokio::test]
    async fn test_download_times_out() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow");
                then.status(200)
                    .delay(Duration::from_millis(500))
                    .body("late");
            })
            .await;

        let dir = tempfile::tempdir()?;
        let mut job = TransferJob::new(dir.path().join("slow.bin"));
        let engine = TransferEngine::new(
            Duration::from_millis(100),
            UploadPolicy {
                max_attempts: 1,
                backoff: Duration::ZERO,
            },
        );
        let result = engine
            .download(&server.url("/slow"), &mut job, &RecordingStatus::default())
            .await;

        assert!(matches!(
            result,
            Err(DownloadError::Timeout(_) | DownloadError::Transport(_))
        ));
        assert_eq!(job.status, JobStatus::Failed);
        Ok(())
    }

    #[tokio::test]
    async fn test_upload_first_try() -> anyhow::Result<()> {
        let channel = ScriptedChannel::new(vec![]);
        let report = engine(3, 1).upload(&channel, &attachment()).await?;
        assert_eq!(report.attempts, 1);
        assert_eq!(report.rate_limited, 0);
        assert_eq!(channel.sent().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_upload_transient_faults_exhaust_budget() {
        let channel = ScriptedChannel::new(vec![
            SendError::Transient("reset".into()),
            SendError::Transient("reset".into()),
            SendError::Transient("reset".into()),
            SendError::Transient("reset".into()),
        ]);

        let started = Instant::now();
        let result = engine(3, 40).upload(&channel, &attachment()).await;

        assert!(matches!(result, Err(UploadError::Exhausted { attempts: 3, .. })));
        assert_eq!(channel.calls(), 3);
        // Two backoffs between three attempts
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_upload_rate_limit_does_not_consume_budget() -> anyhow::Result<()> {
        let channel = ScriptedChannel::new(vec![
            SendError::RateLimited(Duration::from_millis(60)),
            SendError::Transient("reset".into()),
            SendError::Transient("reset".into()),
        ]);

        let started = Instant::now();
        let report = engine(3, 1).upload(&channel, &attachment()).await?;

        assert!(started.elapsed() >= Duration::from_millis(60));
        assert_eq!(report.attempts, 3);
        assert_eq!(report.rate_limited, 1);
        assert_eq!(channel.calls(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_upload_fatal_is_not_retried() {
        let channel = ScriptedChannel::new(vec![SendError::Fatal("bad request".into())]);
        let result = engine(3, 1).upload(&channel, &attachment()).await;
        assert!(matches!(result, Err(UploadError::Rejected(_))));
        assert_eq!(channel.calls(), 1);
    }
}
