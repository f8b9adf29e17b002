//! Shared test doubles for the relay pipeline.
//!
//! These fakes stand in for the chat platform and the rendering sidecar so the
//! pipeline can be exercised end to end against local HTTP mocks.

use crate::relay::error::SendError;
use crate::relay::resolver::render::{PageRenderer, RenderedPage};
use crate::relay::status::{StatusChannel, StatusUpdate};
use crate::relay::transfer::{Attachment, DeliveryChannel};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Status channel that records every update
#[derive(Debug, Default)]
pub struct RecordingStatus {
    updates: Mutex<Vec<StatusUpdate>>,
    cleared: Mutex<bool>,
}

impl RecordingStatus {
    /// Updates received so far, in order
    #[must_use]
    pub fn updates(&self) -> Vec<StatusUpdate> {
        lock(&self.updates).clone()
    }

    /// Number of progress samples received
    #[must_use]
    pub fn progress_count(&self) -> usize {
        lock(&self.updates)
            .iter()
            .filter(|u| matches!(u, StatusUpdate::Progress { .. }))
            .count()
    }

    /// Whether the status message was removed
    #[must_use]
    pub fn cleared(&self) -> bool {
        *lock(&self.cleared)
    }
}

#[async_trait]
impl StatusChannel for RecordingStatus {
    async fn update(&self, update: &StatusUpdate) -> Result<()> {
        lock(&self.updates).push(update.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *lock(&self.cleared) = true;
        Ok(())
    }
}

/// What a [`ScriptedChannel`] saw for one send call
#[derive(Debug, Clone)]
pub struct SendRecord {
    /// The attachment passed in
    pub attachment: Attachment,
    /// Size of the staged file at send time, `None` if it was missing
    pub staged_bytes: Option<u64>,
    /// Entries in the staging directory at send time
    pub staging_entries: usize,
    /// When the call happened
    pub at: Instant,
    /// Whether the call succeeded
    pub accepted: bool,
}

/// Delivery channel that fails with scripted errors, then succeeds
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    script: Mutex<VecDeque<SendError>>,
    records: Mutex<Vec<SendRecord>>,
}

impl ScriptedChannel {
    /// Channel returning `errors` in order before every later call succeeds
    #[must_use]
    pub fn new(errors: Vec<SendError>) -> Self {
        Self {
            script: Mutex::new(errors.into()),
            ..Self::default()
        }
    }

    /// Total send calls, failed ones included
    #[must_use]
    pub fn calls(&self) -> usize {
        lock(&self.records).len()
    }

    /// Every send call
    #[must_use]
    pub fn records(&self) -> Vec<SendRecord> {
        lock(&self.records).clone()
    }

    /// Attachments that were accepted
    #[must_use]
    pub fn sent(&self) -> Vec<Attachment> {
        lock(&self.records)
            .iter()
            .filter(|r| r.accepted)
            .map(|r| r.attachment.clone())
            .collect()
    }

    /// Gaps between consecutive accepted sends
    #[must_use]
    pub fn delivery_gaps(&self) -> Vec<Duration> {
        let times: Vec<Instant> = lock(&self.records)
            .iter()
            .filter(|r| r.accepted)
            .map(|r| r.at)
            .collect();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl DeliveryChannel for ScriptedChannel {
    async fn send(&self, attachment: &Attachment) -> Result<(), SendError> {
        let staged_bytes = std::fs::metadata(&attachment.path).ok().map(|m| m.len());
        let staging_entries = attachment
            .path
            .parent()
            .and_then(|dir| std::fs::read_dir(dir).ok())
            .map_or(0, Iterator::count);
        let outcome = lock(&self.script).pop_front();
        lock(&self.records).push(SendRecord {
            attachment: attachment.clone(),
            staged_bytes,
            staging_entries,
            at: Instant::now(),
            accepted: outcome.is_none(),
        });

        outcome.map_or(Ok(()), Err)
    }
}

/// Renderer returning a fixed page
#[derive(Debug, Default)]
pub struct ScriptedRenderer {
    page: Option<(String, Option<String>)>,
    requested: Mutex<Vec<String>>,
}

impl ScriptedRenderer {
    /// Renderer producing `html`, ending on `final_url` (the requested URL
    /// when `None`)
    #[must_use]
    pub fn new(html: String, final_url: Option<String>) -> Self {
        Self {
            page: Some((html, final_url)),
            requested: Mutex::default(),
        }
    }

    /// Renderer whose every call fails
    #[must_use]
    pub fn failing() -> Self {
        Self::default()
    }

    /// URLs requested so far
    #[must_use]
    pub fn requested(&self) -> Vec<String> {
        lock(&self.requested).clone()
    }
}

#[async_trait]
impl PageRenderer for ScriptedRenderer {
    async fn render(&self, url: &str, _wait_condition: &str, _wait: Duration) -> Result<RenderedPage> {
        lock(&self.requested).push(url.to_string());
        let (html, final_url) = self
            .page
            .clone()
            .ok_or_else(|| anyhow!("renderer unavailable"))?;
        Ok(RenderedPage {
            html,
            final_url: final_url.unwrap_or_else(|| url.to_string()),
        })
    }
}
