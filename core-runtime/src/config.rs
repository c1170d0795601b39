//! # Downloader Configuration
//!
//! Two layers:
//!
//! - [`ConfigFile`] is the small JSON document persisted between runs
//!   (API base URL, credential cookie and optional defaults).
//! - [`DownloaderConfig`] is the immutable, validated settings struct handed
//!   to the download core. It is built once with [`DownloaderConfig::builder`]
//!   and never mutated afterwards.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{ConfigFile, DownloaderConfig};
//!
//! let file = ConfigFile::load("config.json")?;
//! let config = DownloaderConfig::builder()
//!     .api_base_url(file.ncmapi.clone().unwrap_or_default())
//!     .credential(file.cookie.clone().unwrap_or_default())
//!     .output_dir("downloads")
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{QualityTier, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default location of the persisted config document.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Default location of the append-only failure log.
pub const DEFAULT_FAILURE_LOG: &str = "download_failures.log";

/// Upper bound on concurrently running jobs.
pub const MAX_CONCURRENCY: usize = 50;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Persisted configuration document.
///
/// Unknown keys are ignored so older files keep loading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Base URL of the catalog API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ncmapi: Option<String>,

    /// Opaque session credential sent as the `Cookie` header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_log: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityTier>,

    /// `"embed"` or `"file"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyric_mode: Option<String>,
}

impl ConfigFile {
    /// Load the document at `path`. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        serde_json::from_str(&raw).map_err(|e| {
            Error::Config(format!("Invalid config file {}: {}", path.display(), e))
        })
    }

    /// Write the document as pretty JSON, keeping non-ASCII text as-is.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Internal(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "Config file saved");
        Ok(())
    }

    /// True when both the API URL and the credential are present.
    pub fn is_complete(&self) -> bool {
        self.ncmapi.as_deref().is_some_and(|s| !s.trim().is_empty()) && self.cookie.is_some()
    }
}

/// Validated settings for one run of the downloader.
#[derive(Clone)]
pub struct DownloaderConfig {
    /// Catalog API base URL without trailing slash
    pub api_base_url: String,

    /// Session credential; never logged
    pub credential: String,

    /// Root directory for downloaded files
    pub output_dir: PathBuf,

    /// Append-only failure log
    pub failure_log_path: PathBuf,

    /// Timeout for JSON requests against the catalog
    pub request_timeout: Duration,

    /// Timeout for a whole audio stream
    pub stream_timeout: Duration,

    /// Attempts per job for retryable failures
    pub max_attempts: u32,

    /// First backoff delay; doubles per retry
    pub retry_base_delay: Duration,
}

impl std::fmt::Debug for DownloaderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloaderConfig")
            .field("api_base_url", &self.api_base_url)
            .field("credential", &"[REDACTED]")
            .field("output_dir", &self.output_dir)
            .field("failure_log_path", &self.failure_log_path)
            .field("request_timeout", &self.request_timeout)
            .field("stream_timeout", &self.stream_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay", &self.retry_base_delay)
            .finish()
    }
}

impl DownloaderConfig {
    pub fn builder() -> DownloaderConfigBuilder {
        DownloaderConfigBuilder::default()
    }

    /// Backoff schedule between job attempts.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.retry_base_delay,
            max_delay: MAX_RETRY_DELAY,
            use_exponential_backoff: true,
        }
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.is_empty() {
            return Err(Error::Config("API base URL cannot be empty".to_string()));
        }

        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "API base URL must start with http:// or https://, got '{}'",
                self.api_base_url
            )));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(Error::Config("Output directory cannot be empty".to_string()));
        }

        if self.failure_log_path.as_os_str().is_empty() {
            return Err(Error::Config("Failure log path cannot be empty".to_string()));
        }

        if self.max_attempts == 0 {
            return Err(Error::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        if self.request_timeout.is_zero() || self.stream_timeout.is_zero() {
            return Err(Error::Config("Timeouts must be greater than zero".to_string()));
        }

        Ok(())
    }
}

/// Builder for [`DownloaderConfig`].
#[derive(Default)]
pub struct DownloaderConfigBuilder {
    api_base_url: Option<String>,
    credential: Option<String>,
    output_dir: Option<PathBuf>,
    failure_log_path: Option<PathBuf>,
    request_timeout: Option<Duration>,
    stream_timeout: Option<Duration>,
    max_attempts: Option<u32>,
    retry_base_delay: Option<Duration>,
}

impl DownloaderConfigBuilder {
    /// Sets the catalog API base URL. A trailing `/` is trimmed.
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.api_base_url = Some(url.trim().trim_end_matches('/').to_string());
        self
    }

    /// Sets the session credential. An empty string is accepted when set
    /// explicitly (anonymous access).
    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn failure_log_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.failure_log_path = Some(path.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = Some(timeout);
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = Some(delay);
        self
    }

    /// Builds the final `DownloaderConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the API URL or credential is missing or
    /// a value fails validation.
    pub fn build(self) -> Result<DownloaderConfig> {
        let api_base_url = self.api_base_url.ok_or_else(|| {
            Error::Config("API base URL is required. Use .api_base_url() to set it.".to_string())
        })?;

        let credential = self.credential.ok_or_else(|| {
            Error::Config("Credential is required. Use .credential() to set it.".to_string())
        })?;

        let config = DownloaderConfig {
            api_base_url,
            credential,
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from(".")),
            failure_log_path: self
                .failure_log_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FAILURE_LOG)),
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            stream_timeout: self.stream_timeout.unwrap_or(DEFAULT_STREAM_TIMEOUT),
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            retry_base_delay: self.retry_base_delay.unwrap_or(DEFAULT_RETRY_BASE_DELAY),
        };

        config.validate()?;

        Ok(config)
    }
}
