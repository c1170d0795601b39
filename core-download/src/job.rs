//! # Download Job
//!
//! Runs one song through the pipeline
//!
//! ```text
//! FetchingMetadata → ResolvingUrl → FetchingLyrics → StreamingAudio
//!   → VerifyingIntegrity → InjectingTags → WritingLyricFile → Done
//! ```
//!
//! and turns whatever happens into exactly one [`JobOutcome`].
//!
//! ## Retry policy
//!
//! A failed attempt restarts the pipeline from the first stage while
//! [`ErrorKind::is_retryable`] holds and attempts remain. A rights
//! restriction ends the job immediately as `SkippedNoRights`. Only the final
//! failure reaches the failure log.
//!
//! ## Files
//!
//! Audio is streamed straight to its final path. If streaming breaks or the
//! on-disk size differs from the declared length, the file is removed before
//! the next attempt. A tagging failure keeps the audio in place.

use crate::error::{ErrorKind, JobError};
use crate::failure_log::FailureSink;
use crate::models::{
    DownloadedSong, FailureLogEntry, JobOutcome, JobReport, JobStage, LyricFileStatus, LyricMode,
};
use crate::naming::{lyric_file_path, song_file_name};
use bridge_traits::catalog::{CatalogProvider, QualityTier, ResolvedAudio, SongRef};
use bridge_traits::http::{HttpClient, HttpRequest, RetryPolicy};
use bridge_traits::time::{Clock, SystemClock};
use core_metadata::artwork::CoverArtFetcher;
use core_metadata::lyrics::normalize_lyrics;
use core_metadata::tagging::{TagInjector, TrackTags};
use core_runtime::config::DownloaderConfig;
use core_runtime::events::{DownloadEvent, EventBus};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn, Span};

/// Read buffer for the audio stream.
const CHUNK_SIZE: usize = 64 * 1024;

/// Progress granularity when the total length is unknown.
const UNKNOWN_LENGTH_PROGRESS_STEP: u64 = 512 * 1024;

// =============================================================================
// Settings
// =============================================================================

/// Per-batch job parameters.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub quality: QualityTier,
    pub lyric_mode: LyricMode,
    /// Attempts per job, including the first.
    pub max_attempts: u32,
    /// Backoff between attempts.
    pub retry_policy: RetryPolicy,
    /// Budget for one audio stream.
    pub stream_timeout: Duration,
    /// Budget for the cover download.
    pub request_timeout: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            quality: QualityTier::default(),
            lyric_mode: LyricMode::default(),
            max_attempts: 3,
            retry_policy: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(10),
                use_exponential_backoff: true,
            },
            stream_timeout: Duration::from_secs(300),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl JobSettings {
    pub fn from_config(config: &DownloaderConfig, quality: QualityTier, lyric_mode: LyricMode) -> Self {
        Self {
            quality,
            lyric_mode,
            max_attempts: config.max_attempts,
            retry_policy: config.retry_policy(),
            stream_timeout: config.stream_timeout,
            request_timeout: config.request_timeout,
        }
    }

    pub fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_lyric_mode(mut self, mode: LyricMode) -> Self {
        self.lyric_mode = mode;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self.retry_policy.max_attempts = attempts;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_policy.base_delay = delay;
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }
}

// =============================================================================
// Job
// =============================================================================

/// Single-song download pipeline. Cheap to clone; every worker of a batch
/// shares the same collaborators.
#[derive(Clone)]
pub struct DownloadJob {
    settings: JobSettings,
    catalog: Arc<dyn CatalogProvider>,
    http_client: Arc<dyn HttpClient>,
    tag_injector: Arc<dyn TagInjector>,
    covers: CoverArtFetcher,
    failure_sink: Arc<dyn FailureSink>,
    events: EventBus,
    clock: Arc<dyn Clock>,
}

impl DownloadJob {
    pub fn new(
        settings: JobSettings,
        catalog: Arc<dyn CatalogProvider>,
        http_client: Arc<dyn HttpClient>,
        tag_injector: Arc<dyn TagInjector>,
        failure_sink: Arc<dyn FailureSink>,
    ) -> Self {
        let covers = CoverArtFetcher::new(Arc::clone(&http_client), settings.request_timeout);
        Self {
            settings,
            catalog,
            http_client,
            tag_injector,
            covers,
            failure_sink,
            events: EventBus::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cover_fetcher(mut self, covers: CoverArtFetcher) -> Self {
        self.covers = covers;
        self
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Run the job to its terminal outcome, writing below `dest_dir`.
    ///
    /// Never fails: every error becomes part of the returned report.
    #[instrument(skip(self, song, dest_dir), fields(song_id = %song.id))]
    pub async fn run(&self, song: &SongRef, dest_dir: &Path) -> JobReport {
        self.emit(DownloadEvent::JobStarted {
            song_id: song.id.clone(),
        });

        let mut song_name: Option<String> = None;
        let mut attempts = 0u32;

        let outcome = loop {
            attempts += 1;

            let error = match self.attempt(song, dest_dir, attempts, &mut song_name).await {
                Ok(downloaded) => break JobOutcome::Success(downloaded),
                Err(error) => error,
            };

            let kind = error.kind();
            if kind == ErrorKind::RightsRestricted {
                info!(reason = %error, "No accessible stream, skipping");
                break JobOutcome::SkippedNoRights {
                    reason: error.to_string(),
                };
            }

            if !kind.is_retryable() || attempts >= self.settings.max_attempts {
                break JobOutcome::Failed {
                    kind,
                    detail: error.to_string(),
                };
            }

            let delay = self.settings.retry_policy.delay_for(attempts - 1);
            warn!(
                attempt = attempts,
                max_attempts = self.settings.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Attempt failed, retrying"
            );
            self.emit(DownloadEvent::JobRetrying {
                song_id: song.id.clone(),
                attempt: attempts,
                reason: error.to_string(),
            });
            sleep(delay).await;
        };

        match &outcome {
            JobOutcome::Success(downloaded) => {
                info!(attempts, bytes = downloaded.bytes, "Download complete");
            }
            other => {
                warn!(attempts, detail = ?other.detail(), "Download did not complete");
                self.record_failure(song, song_name.clone(), other).await;
            }
        }

        self.emit(DownloadEvent::JobFinished {
            song_id: song.id.clone(),
            status: outcome.status(),
            detail: outcome.detail(),
        });

        JobReport {
            song_id: song.id.clone(),
            song_name,
            attempts,
            outcome,
        }
    }

    #[instrument(
        skip(self, song, dest_dir, song_name),
        fields(song_id = %song.id, stage = tracing::field::Empty)
    )]
    async fn attempt(
        &self,
        song: &SongRef,
        dest_dir: &Path,
        attempt: u32,
        song_name: &mut Option<String>,
    ) -> Result<DownloadedSong, JobError> {
        enter_stage(JobStage::FetchingMetadata);
        let metadata = self.catalog.fetch_song_metadata(&song.id).await?;
        *song_name = Some(metadata.title.clone());

        enter_stage(JobStage::ResolvingUrl);
        let audio = self
            .catalog
            .resolve_download_url(&song.id, self.settings.quality)
            .await?;
        if let Some(level) = audio.level.as_deref() {
            if level != self.settings.quality.as_str() {
                debug!(requested = %self.settings.quality, granted = level, "Catalog granted a different tier");
            }
        }

        enter_stage(JobStage::FetchingLyrics);
        let lyrics = self.fetch_lyrics(&song.id).await;

        enter_stage(JobStage::StreamingAudio);
        let path = dest_dir.join(song_file_name(&metadata, audio.container));
        let expected = self.stream_to_file(song, &audio, &path).await?;

        enter_stage(JobStage::VerifyingIntegrity);
        let bytes = match verify_integrity(&path, expected).await {
            Ok(bytes) => bytes,
            Err(error) => {
                remove_partial(&path).await;
                return Err(error);
            }
        };

        enter_stage(JobStage::InjectingTags);
        let cover = self.covers.fetch(metadata.cover_url.as_deref()).await;
        let embedded_cover = cover.is_some();
        let embedded_lyrics = !lyrics.is_empty();
        let tags = TrackTags::from_metadata(&metadata, lyrics, cover);
        self.tag_injector.inject(&path, &tags).await?;

        enter_stage(JobStage::WritingLyricFile);
        let lyric_file = self.write_lyric_file(&path, &tags.lyrics).await;

        enter_stage(JobStage::Done);
        Ok(DownloadedSong {
            path,
            bytes,
            lyric_file,
            embedded_lyrics,
            embedded_cover,
        })
    }

    /// Normalized lyrics, or empty text when there are none or they are
    /// unusable.
    async fn fetch_lyrics(&self, song_id: &str) -> String {
        let raw = match self.catalog.fetch_lyrics(song_id).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Lyrics unavailable, continuing without");
                return String::new();
            }
        };

        match normalize_lyrics(&raw) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Lyrics malformed, continuing without");
                String::new()
            }
        }
    }

    /// Stream the audio to `path`. Returns the expected length, taken from
    /// the response framing or, failing that, the catalog.
    async fn stream_to_file(
        &self,
        song: &SongRef,
        audio: &ResolvedAudio,
        path: &Path,
    ) -> Result<Option<u64>, JobError> {
        let request = HttpRequest::get(audio.url.clone()).timeout(self.settings.stream_timeout);
        let mut stream = self.http_client.download_stream(request).await?;
        let expected = stream.content_length.or(audio.size);

        self.emit(DownloadEvent::FileStarted {
            song_id: song.id.clone(),
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            total_bytes: expected,
        });

        let mut file = tokio::fs::File::create(path).await?;
        let mut progress = ProgressThrottle::new(expected);
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;

        let copied: Result<(), JobError> = async {
            loop {
                let read = stream
                    .reader
                    .read(&mut buffer)
                    .await
                    .map_err(|e| JobError::Stream(e.to_string()))?;
                if read == 0 {
                    break;
                }

                file.write_all(&buffer[..read]).await?;
                written += read as u64;

                if progress.advance(written) {
                    self.emit(DownloadEvent::Progress {
                        song_id: song.id.clone(),
                        bytes_written: written,
                        total_bytes: expected,
                    });
                }
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok::<(), JobError>(())
        }
        .await;
        drop(file);

        if let Err(error) = copied {
            remove_partial(path).await;
            return Err(error);
        }

        debug!(bytes = written, "Stream finished");
        Ok(expected)
    }

    async fn write_lyric_file(&self, audio_path: &Path, lyrics: &str) -> LyricFileStatus {
        if !self.settings.lyric_mode.writes_file() {
            return LyricFileStatus::NotRequested;
        }
        if lyrics.trim().is_empty() {
            return LyricFileStatus::NoLyrics;
        }

        let path = lyric_file_path(audio_path);
        match tokio::fs::write(&path, lyrics.as_bytes()).await {
            Ok(()) => LyricFileStatus::Written(path),
            Err(e) => {
                warn!(error = %e, "Failed to write lyric file");
                LyricFileStatus::Failed(e.to_string())
            }
        }
    }

    async fn record_failure(&self, song: &SongRef, song_name: Option<String>, outcome: &JobOutcome) {
        let (kind, message) = match outcome {
            JobOutcome::Success(_) => return,
            JobOutcome::SkippedNoRights { reason } => (ErrorKind::RightsRestricted, reason.clone()),
            JobOutcome::Failed { kind, detail } => (*kind, detail.clone()),
        };

        let entry = FailureLogEntry {
            song_id: song.id.clone(),
            song_name,
            kind,
            message,
            timestamp: self.clock.now(),
        };

        if let Err(e) = self.failure_sink.append(entry).await {
            error!(error = %e, "Failed to append to failure log");
        }
    }

    fn emit(&self, event: DownloadEvent) {
        // No subscribers is fine.
        self.events.emit(event).ok();
    }
}

fn enter_stage(stage: JobStage) {
    Span::current().record("stage", stage.as_str());
    debug!(stage = %stage, "Entering stage");
}

/// Size on disk, checked against the declared length when there is one.
async fn verify_integrity(path: &Path, expected: Option<u64>) -> Result<u64, JobError> {
    let actual = tokio::fs::metadata(path).await?.len();

    match expected {
        Some(expected) if expected != actual => Err(JobError::IntegrityMismatch { expected, actual }),
        Some(_) => Ok(actual),
        None => {
            debug!(bytes = actual, "No declared length, size not verified");
            Ok(actual)
        }
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(error = %e, "Failed to remove partial file"),
    }
}

/// Decides which byte counts are worth a `Progress` event.
#[derive(Debug)]
struct ProgressThrottle {
    total: Option<u64>,
    last_percent: Option<u64>,
    last_reported: u64,
}

impl ProgressThrottle {
    fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            last_percent: None,
            last_reported: 0,
        }
    }

    /// `true` when `written` crosses a whole percent (known length) or
    /// another 512 KiB (unknown length).
    fn advance(&mut self, written: u64) -> bool {
        match self.total {
            Some(total) => {
                let percent = written.min(total) * 100 / total;
                if self.last_percent == Some(percent) {
                    return false;
                }
                self.last_percent = Some(percent);
                true
            }
            None => {
                if written - self.last_reported < UNKNOWN_LENGTH_PROGRESS_STEP {
                    return false;
                }
                self.last_reported = written;
                true
            }
        }
    }
}
