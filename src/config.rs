//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! pipeline constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,
    /// Base URL of a self-hosted `telegram-bot-api` server; the public API is
    /// used when unset
    pub telegram_api_url: Option<String>,

    /// Directory holding transient staging files
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Resolution endpoint fronting the challenge-gated file host
    #[serde(default = "default_challenge_endpoint")]
    pub challenge_endpoint: String,
    /// Base URL of the Crawl4AI rendering sidecar (browser strategy is disabled when unset)
    pub renderer_url: Option<String>,
    /// Pre-solved `__test` verification cookie for the direct replay strategy
    pub challenge_cookie: Option<String>,

    /// Companion endpoint extracting reel videos
    #[serde(default = "default_reel_endpoint")]
    pub reel_endpoint: String,
    /// Companion endpoint extracting post photos
    #[serde(default = "default_photo_endpoint")]
    pub photo_endpoint: String,

    /// Absolute cap on a staged file, in bytes. Defaults to what the Bot API
    /// in use accepts, see [`Settings::max_file_size`]
    pub max_file_size_bytes: Option<u64>,
    /// Wall-clock budget for one download attempt
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    /// Timeout for each resolver HTTP call
    #[serde(default = "default_resolve_timeout_secs")]
    pub resolve_timeout_secs: u64,
    /// How long the rendering context may wait for the challenge to clear
    #[serde(default = "default_challenge_wait_secs")]
    pub challenge_wait_secs: u64,
    /// Upload attempts before giving up on transient faults
    #[serde(default = "default_upload_max_attempts")]
    pub upload_max_attempts: usize,
    /// Pause between upload attempts after a transient fault
    #[serde(default = "default_upload_backoff_secs")]
    pub upload_backoff_secs: u64,
    /// Pause between consecutive files of a photo set
    #[serde(default = "default_photo_interval_ms")]
    pub photo_interval_ms: u64,
    /// Requests processed concurrently across all chats
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_challenge_endpoint() -> String {
    "http://smex.unaux.com/fastbox.php".to_string()
}

fn default_reel_endpoint() -> String {
    "https://snapdownloader.com/tools/instagram-reels-downloader/download".to_string()
}

fn default_photo_endpoint() -> String {
    "https://snapdownloader.com/tools/instagram-photo-downloader/download".to_string()
}

const fn default_download_timeout_secs() -> u64 {
    DOWNLOAD_TIMEOUT_SECS
}

const fn default_resolve_timeout_secs() -> u64 {
    RESOLVE_TIMEOUT_SECS
}

const fn default_challenge_wait_secs() -> u64 {
    CHALLENGE_WAIT_SECS
}

const fn default_upload_max_attempts() -> usize {
    UPLOAD_MAX_ATTEMPTS
}

const fn default_upload_backoff_secs() -> u64 {
    UPLOAD_BACKOFF_SECS
}

const fn default_photo_interval_ms() -> u64 {
    PHOTO_INTERVAL_MS
}

const fn default_max_concurrent_requests() -> usize {
    MAX_CONCURRENT_REQUESTS
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use oxide_relay::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Plain UPPER_SNAKE_CASE variables; empty values count as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Settings with every optional field at its default, for the given token
    #[must_use]
    pub fn with_token(telegram_token: impl Into<String>) -> Self {
        Self {
            telegram_token: telegram_token.into(),
            telegram_api_url: None,
            staging_dir: default_staging_dir(),
            challenge_endpoint: default_challenge_endpoint(),
            renderer_url: None,
            challenge_cookie: None,
            reel_endpoint: default_reel_endpoint(),
            photo_endpoint: default_photo_endpoint(),
            max_file_size_bytes: None,
            download_timeout_secs: DOWNLOAD_TIMEOUT_SECS,
            resolve_timeout_secs: RESOLVE_TIMEOUT_SECS,
            challenge_wait_secs: CHALLENGE_WAIT_SECS,
            upload_max_attempts: UPLOAD_MAX_ATTEMPTS,
            upload_backoff_secs: UPLOAD_BACKOFF_SECS,
            photo_interval_ms: PHOTO_INTERVAL_MS,
            max_concurrent_requests: MAX_CONCURRENT_REQUESTS,
        }
    }

    /// Size cap for a staged file.
    ///
    /// The public Bot API refuses uploads over 50 MB, so without a self-hosted
    /// server the cap falls back to that limit instead of 2 GiB.
    #[must_use]
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size_bytes.unwrap_or(if self.telegram_api_url.is_some() {
            MAX_FILE_SIZE_BYTES
        } else {
            PUBLIC_API_MAX_FILE_SIZE_BYTES
        })
    }

    /// Budget for one download attempt
    #[must_use]
    pub const fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Timeout for resolver HTTP calls
    #[must_use]
    pub const fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Wait budget for the rendering context
    #[must_use]
    pub const fn challenge_wait(&self) -> Duration {
        Duration::from_secs(self.challenge_wait_secs)
    }

    /// Backoff after a transient upload fault
    #[must_use]
    pub const fn upload_backoff(&self) -> Duration {
        Duration::from_secs(self.upload_backoff_secs)
    }

    /// Pause between photo-set files
    #[must_use]
    pub const fn photo_interval(&self) -> Duration {
        Duration::from_millis(self.photo_interval_ms)
    }
}

// Pipeline limits
/// Absolute size cap for a relayed file (2 GiB)
pub const MAX_FILE_SIZE_BYTES: u64 = 2 * 1024 * 1024 * 1024;
/// Upload limit of the public Bot API (50 MB)
pub const PUBLIC_API_MAX_FILE_SIZE_BYTES: u64 = 50 * 1000 * 1000;
/// Download attempt timeout in seconds
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 300; // 5 minutes
/// Resolver HTTP timeout in seconds
pub const RESOLVE_TIMEOUT_SECS: u64 = 30;
/// Rendering context wait in seconds
pub const CHALLENGE_WAIT_SECS: u64 = 10;
/// Upload retry budget
pub const UPLOAD_MAX_ATTEMPTS: usize = 3;
/// Upload backoff in seconds
pub const UPLOAD_BACKOFF_SECS: u64 = 5;
/// Pause between photo uploads in milliseconds
pub const PHOTO_INTERVAL_MS: u64 = 1000;
/// Concurrent request limit
pub const MAX_CONCURRENT_REQUESTS: usize = 3;
/// Read buffer size for streaming downloads
pub const DOWNLOAD_BUFFER_SIZE: usize = 8192;
/// Percentage points between two download progress reports
pub const PROGRESS_STEP_PERCENT: f64 = 10.0;

/// Browser-like User-Agent sent to companion endpoints
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
/// Mobile User-Agent sent to the photo extraction endpoint
pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";

// Telegram API retry configuration
/// Maximum retries for status message edits
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff in milliseconds
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff in milliseconds
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
