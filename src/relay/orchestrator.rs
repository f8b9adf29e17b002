//! Per-request state machine.
//!
//! [`Orchestrator::handle`] drives one [`DeliveryRequest`] from the incoming
//! text to delivery. Stages only move forward; every file is downloaded,
//! validated, uploaded and removed before the next one starts, so at most one
//! staging file exists per request.

use super::classifier::{classify, select_primary};
use super::resolver::Resolver;
use super::staging::{staging_extension, StagingFile};
use super::status::{StatusChannel, StatusUpdate};
use super::transfer::{Attachment, AttachmentKind, DeliveryChannel, TransferEngine, UploadPolicy};
use super::{DeliveryRequest, FailureReason, ResolvedMedia, SourceReference, Stage, TransferJob};
use crate::config::Settings;
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Limits applied while relaying files
#[derive(Debug, Clone)]
pub struct RelayLimits {
    /// Directory for staging files
    pub staging_dir: PathBuf,
    /// Absolute cap on a staged file
    pub max_file_size: u64,
    /// Pause between consecutive photo-set files
    pub photo_interval: Duration,
}

impl RelayLimits {
    /// Limits taken from settings
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            staging_dir: settings.staging_dir.clone(),
            max_file_size: settings.max_file_size(),
            photo_interval: settings.photo_interval(),
        }
    }
}

/// One file of the resolved media
struct FileSlot<'a> {
    reference: &'a SourceReference,
    media: &'a ResolvedMedia,
    location: &'a str,
    index: usize,
    total: usize,
}

impl FileSlot<'_> {
    fn staging_name(&self) -> (&'static str, String) {
        match self.media {
            ResolvedMedia::SingleVideo { .. } => ("video", "mp4".to_string()),
            ResolvedMedia::PhotoSet { .. } => ("photo", "jpg".to_string()),
            ResolvedMedia::OpaqueFile { display_name, .. } => {
                ("terabox", staging_extension(display_name, "mp4"))
            }
        }
    }

    fn download_label(&self) -> String {
        match self.media {
            ResolvedMedia::PhotoSet { .. } => "image".to_string(),
            other => other.display_name().to_string(),
        }
    }

    fn attachment(&self, staged: &StagingFile) -> Attachment {
        let url = &self.reference.raw_url;
        match self.media {
            ResolvedMedia::PhotoSet { .. } => Attachment {
                path: staged.path().to_path_buf(),
                kind: AttachmentKind::Photo,
                caption: format!(
                    "📸 Image {}/{}\n\n🔗 Original URL: {url}",
                    self.index + 1,
                    self.total
                ),
            },
            ResolvedMedia::SingleVideo { .. } | ResolvedMedia::OpaqueFile { .. } => Attachment {
                path: staged.path().to_path_buf(),
                kind: AttachmentKind::for_path(staged.path()),
                caption: format!("🔗 Original URL: {url}"),
            },
        }
    }
}

/// Drives delivery requests through classification, resolution and transfer
pub struct Orchestrator {
    resolver: Resolver,
    engine: TransferEngine,
    limits: RelayLimits,
}

impl Orchestrator {
    /// Create an orchestrator from its parts
    #[must_use]
    pub const fn new(resolver: Resolver, engine: TransferEngine, limits: RelayLimits) -> Self {
        Self {
            resolver,
            engine,
            limits,
        }
    }

    /// Production orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured endpoint is invalid.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let engine = TransferEngine::new(
            settings.download_timeout(),
            UploadPolicy {
                max_attempts: settings.upload_max_attempts.max(1),
                backoff: settings.upload_backoff(),
            },
        );
        Ok(Self::new(
            Resolver::from_settings(settings)?,
            engine,
            RelayLimits::from_settings(settings),
        ))
    }

    /// Process one incoming message end to end.
    ///
    /// Pipeline failures end in [`Stage::Failed`] and are reported through
    /// `status`; they are not errors.
    ///
    /// # Errors
    ///
    /// Returns an error only for internal faults, such as the staging
    /// directory being unusable.
    pub async fn handle(
        &self,
        text: &str,
        channel: &dyn DeliveryChannel,
        status: &dyn StatusChannel,
    ) -> Result<DeliveryRequest> {
        let mut request = DeliveryRequest::new();

        let references = classify(text);
        advance(&mut request, Stage::Classified);

        let Some(reference) = select_primary(&references).cloned() else {
            fail(&mut request, FailureReason::NoUrl, status).await;
            return Ok(request);
        };
        if references.len() > 1 {
            info!(
                found = references.len(),
                selected = %reference.raw_url,
                "Several links found, processing one"
            );
        }

        request.reference = Some(reference.clone());
        advance(&mut request, Stage::Resolving);
        notify(
            status,
            &StatusUpdate::Processing {
                provider: reference.provider,
            },
        )
        .await;

        let media = match self.resolver.resolve(&reference).await {
            Ok(media) => media,
            Err(e) => {
                info!(url = %reference.raw_url, error = %e, "Resolution failed");
                fail(&mut request, FailureReason::ResolveFailed, status).await;
                return Ok(request);
            }
        };
        request.media = Some(media.clone());
        advance(&mut request, Stage::Resolved);

        let locations = media.fetch_locations();
        let total = locations.len();
        for (index, location) in locations.into_iter().enumerate() {
            if index > 0 && matches!(media, ResolvedMedia::PhotoSet { .. }) {
                tokio::time::sleep(self.limits.photo_interval).await;
            }

            let slot = FileSlot {
                reference: &reference,
                media: &media,
                location,
                index,
                total,
            };
            if let Some(reason) = self.relay_file(&mut request, &slot, channel, status).await? {
                fail(&mut request, reason, status).await;
                return Ok(request);
            }
        }

        advance(&mut request, Stage::Delivered);
        info!(url = %reference.raw_url, files = total, "Delivery complete");
        if let Err(e) = status.clear().await {
            debug!(error = %e, "Status message removal failed");
        }
        Ok(request)
    }

    /// Download, validate and upload one file.
    ///
    /// Returns the failure reason when the file could not be delivered. The
    /// staging file is gone when this returns, whatever the outcome.
    async fn relay_file(
        &self,
        request: &mut DeliveryRequest,
        slot: &FileSlot<'_>,
        channel: &dyn DeliveryChannel,
        status: &dyn StatusChannel,
    ) -> Result<Option<FailureReason>> {
        let (prefix, extension) = slot.staging_name();
        let staged =
            StagingFile::reserve(&self.limits.staging_dir, prefix, slot.index, &extension).await?;

        let outcome = self
            .transfer_file(request, slot, &staged, channel, status)
            .await;
        if let Err(e) = staged.remove().await {
            warn!(error = %e, "Failed to remove staging file");
        }
        outcome
    }

    async fn transfer_file(
        &self,
        request: &mut DeliveryRequest,
        slot: &FileSlot<'_>,
        staged: &StagingFile,
        channel: &dyn DeliveryChannel,
        status: &dyn StatusChannel,
    ) -> Result<Option<FailureReason>> {
        request.jobs.push(TransferJob::new(staged.path().to_path_buf()));
        let job = request.jobs.len() - 1;

        advance(request, Stage::Downloading(slot.index));
        notify(
            status,
            &StatusUpdate::Downloading {
                name: slot.download_label(),
                declared_size: slot.media.declared_size().map(str::to_string),
                index: slot.index + 1,
                total: slot.total,
            },
        )
        .await;

        if let Err(e) = self
            .engine
            .download(slot.location, &mut request.jobs[job], status)
            .await
        {
            info!(index = slot.index, error = %e, "File download failed");
            return Ok(Some(FailureReason::DownloadFailed));
        }
        advance(request, Stage::Downloaded(slot.index));

        advance(request, Stage::Validating(slot.index));
        let size = staged.size().await?;
        if size > self.limits.max_file_size {
            info!(size, limit = self.limits.max_file_size, "Staged file over size cap");
            return Ok(Some(FailureReason::TooLarge {
                size,
                limit: self.limits.max_file_size,
            }));
        }

        advance(request, Stage::Uploading(slot.index));
        notify(
            status,
            &StatusUpdate::Uploading {
                index: slot.index + 1,
                total: slot.total,
            },
        )
        .await;

        let attachment = slot.attachment(staged);
        match self.engine.upload(channel, &attachment).await {
            Ok(report) => debug!(
                attempts = report.attempts,
                rate_limited = report.rate_limited,
                "File uploaded"
            ),
            Err(e) => {
                warn!(index = slot.index, error = %e, "File upload failed");
                return Ok(Some(FailureReason::UploadFailed));
            }
        }
        Ok(None)
    }
}

fn advance(request: &mut DeliveryRequest, next: Stage) {
    if request.stage.can_advance_to(&next) {
        debug!(from = ?request.stage, to = ?next, "Stage transition");
        request.stage = next;
    } else {
        warn!(from = ?request.stage, to = ?next, "Rejected backward stage transition");
    }
}

async fn fail(request: &mut DeliveryRequest, reason: FailureReason, status: &dyn StatusChannel) {
    notify(status, &StatusUpdate::Failed(reason.clone())).await;
    advance(request, Stage::Failed(reason));
}

async fn notify(status: &dyn StatusChannel, update: &StatusUpdate) {
    if let Err(e) = status.update(update).await {
        debug!(error = %e, "Status update failed");
    }
}
