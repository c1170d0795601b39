//! # Batch Orchestrator
//!
//! Expands a request into one [`DownloadJob`] per song and runs them with
//! bounded parallelism.
//!
//! ## Overview
//!
//! - Collections are expanded through the [`CatalogProvider`]; a failure of
//!   the top-level request aborts the run, a failed sub-collection is logged
//!   and skipped.
//! - Every group gets its folder before any job is dispatched.
//! - At most `concurrency` jobs run at once. Jobs never affect each other;
//!   the batch waits for all of them.
//! - The [`BatchReport`] lists failed ids in batch order.
//!
//! ## Usage
//!
//! ```ignore
//! use core_download::{BatchOptions, DownloadRequest, Orchestrator};
//!
//! let orchestrator = Orchestrator::new(config, catalog, http, injector, failure_log)
//!     .with_event_bus(events.clone());
//!
//! let report = orchestrator
//!     .run(&DownloadRequest::Song("186016".into()), &BatchOptions::default())
//!     .await?;
//! println!("{} succeeded, {} failed", report.succeeded, report.failed());
//! ```

use crate::destination::{CollectionFolders, DestinationResolver};
use crate::error::{DownloadError, ErrorKind, Result};
use crate::failure_log::FailureSink;
use crate::job::{DownloadJob, JobSettings};
use crate::models::{BatchReport, DownloadRequest, FailureLogEntry, JobOutcome, JobReport, LyricMode};
use bridge_traits::catalog::{
    CatalogProvider, CollectionGroup, ExpandedCollection, QualityTier, SkippedGroup, SongRef,
};
use bridge_traits::http::HttpClient;
use bridge_traits::time::{Clock, SystemClock};
use core_metadata::tagging::TagInjector;
use core_runtime::config::{DownloaderConfig, MAX_CONCURRENCY};
use core_runtime::events::{DownloadEvent, EventBus};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn, Span};
use uuid::Uuid;

/// Parallel jobs when the caller does not choose.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Parameters the front end hands to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub quality: QualityTier,
    pub lyric_mode: LyricMode,
    pub concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            quality: QualityTier::default(),
            lyric_mode: LyricMode::default(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl BatchOptions {
    pub fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_lyric_mode(mut self, mode: LyricMode) -> Self {
        self.lyric_mode = mode;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Clamp a requested worker count into `1..=MAX_CONCURRENCY`.
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_CONCURRENCY)
}

/// Runs download batches.
pub struct Orchestrator {
    config: DownloaderConfig,
    catalog: Arc<dyn CatalogProvider>,
    http_client: Arc<dyn HttpClient>,
    tag_injector: Arc<dyn TagInjector>,
    failure_sink: Arc<dyn FailureSink>,
    events: EventBus,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(
        config: DownloaderConfig,
        catalog: Arc<dyn CatalogProvider>,
        http_client: Arc<dyn HttpClient>,
        tag_injector: Arc<dyn TagInjector>,
        failure_sink: Arc<dyn FailureSink>,
    ) -> Self {
        Self {
            config,
            catalog,
            http_client,
            tag_injector,
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

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Expand `request` and download everything it names into the
    /// configured output directory.
    ///
    /// # Errors
    ///
    /// Fails only when the request itself cannot be expanded or the output
    /// folders cannot be created. Per-song failures are in the report.
    pub async fn run(&self, request: &DownloadRequest, options: &BatchOptions) -> Result<BatchReport> {
        let plan = self.expand(request).await?;

        for skipped in &plan.skipped {
            self.record_skipped_group(skipped).await;
        }

        let resolver = CollectionFolders::new(self.config.output_dir.clone());
        let mut report = self.run_batch(plan.groups, &resolver, options).await?;
        report.skipped_groups = plan.skipped;
        Ok(report)
    }

    async fn expand(&self, request: &DownloadRequest) -> Result<ExpandedCollection> {
        match request {
            DownloadRequest::Song(id) => Ok(ExpandedCollection {
                title: id.clone(),
                groups: vec![CollectionGroup {
                    name: String::new(),
                    songs: vec![SongRef::new(id.clone())],
                }],
                skipped: Vec::new(),
            }),
            DownloadRequest::Collection { kind, id } => {
                let expanded = self
                    .catalog
                    .expand_collection(*kind, id)
                    .await
                    .map_err(|source| DownloadError::Expansion {
                        kind: *kind,
                        id: id.clone(),
                        source,
                    })?;

                info!(
                    %kind,
                    id = %id,
                    title = %expanded.title,
                    groups = expanded.groups.len(),
                    songs = expanded.total_songs(),
                    skipped = expanded.skipped.len(),
                    "Collection expanded"
                );
                Ok(expanded)
            }
        }
    }

    /// Run one job per song of `groups`, each group in the directory
    /// `resolver` assigns it.
    #[instrument(skip_all, fields(batch_id = tracing::field::Empty))]
    pub async fn run_batch(
        &self,
        groups: Vec<CollectionGroup>,
        resolver: &dyn DestinationResolver,
        options: &BatchOptions,
    ) -> Result<BatchReport> {
        let batch_id = Uuid::new_v4().to_string();
        Span::current().record("batch_id", batch_id.as_str());

        let concurrency = clamp_concurrency(options.concurrency);
        if concurrency != options.concurrency {
            warn!(
                requested = options.concurrency,
                used = concurrency,
                "Concurrency out of range, clamped"
            );
        }

        // Folders first, so a broken output location fails before any job runs.
        let mut planned: Vec<(PathBuf, Vec<SongRef>)> = Vec::with_capacity(groups.len());
        for group in groups {
            let dir = resolver.directory_for(&group.name);
            tokio::fs::create_dir_all(&dir).await?;
            planned.push((dir, group.songs));
        }

        let total: usize = planned.iter().map(|(_, songs)| songs.len()).sum();
        info!(total, concurrency, quality = %options.quality, lyric_mode = %options.lyric_mode, "Starting batch");
        self.emit(DownloadEvent::BatchStarted {
            batch_id: batch_id.clone(),
            total,
        });

        let settings = JobSettings::from_config(&self.config, options.quality, options.lyric_mode);
        let job = Arc::new(
            DownloadJob::new(
                settings,
                Arc::clone(&self.catalog),
                Arc::clone(&self.http_client),
                Arc::clone(&self.tag_injector),
                Arc::clone(&self.failure_sink),
            )
            .with_event_bus(self.events.clone())
            .with_clock(Arc::clone(&self.clock)),
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut handles = Vec::with_capacity(total);

        for (dir, songs) in planned {
            for song in songs {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| DownloadError::Internal(format!("worker pool closed: {}", e)))?;
                let job = Arc::clone(&job);
                let dir = dir.clone();
                let song_id = song.id.clone();

                let handle = tokio::spawn(async move {
                    let report = job.run(&song, &dir).await;
                    drop(permit);
                    report
                });

                handles.push((song_id, handle));
            }
        }

        let mut report = BatchReport {
            batch_id: batch_id.clone(),
            ..Default::default()
        };

        for (song_id, handle) in handles {
            let job_report = match handle.await {
                Ok(job_report) => job_report,
                Err(e) => {
                    error!(song_id = %song_id, error = %e, "Job task panicked");
                    self.job_task_failed(song_id, e.to_string()).await
                }
            };

            if job_report.outcome.is_success() {
                report.succeeded += 1;
            } else {
                report.failed_ids.push(job_report.song_id.clone());
            }
            report.jobs.push(job_report);
        }

        warn_on_collisions(&report.jobs);

        info!(
            succeeded = report.succeeded,
            failed = report.failed(),
            "Batch completed"
        );
        self.emit(DownloadEvent::BatchCompleted {
            batch_id,
            succeeded: report.succeeded,
            failed: report.failed(),
        });

        Ok(report)
    }

    async fn record_skipped_group(&self, skipped: &SkippedGroup) {
        warn!(
            group_id = %skipped.id,
            group = %skipped.name,
            reason = %skipped.reason,
            "Skipping sub-collection"
        );
        self.emit(DownloadEvent::GroupSkipped {
            name: skipped.name.clone(),
            reason: skipped.reason.clone(),
        });

        let entry = FailureLogEntry {
            song_id: skipped.id.clone(),
            song_name: Some(skipped.name.clone()),
            kind: ErrorKind::CollectionExpansionError,
            message: skipped.reason.clone(),
            timestamp: self.clock.now(),
        };
        if let Err(e) = self.failure_sink.append(entry).await {
            error!(error = %e, "Failed to append to failure log");
        }
    }

    async fn job_task_failed(&self, song_id: String, detail: String) -> JobReport {
        let entry = FailureLogEntry {
            song_id: song_id.clone(),
            song_name: None,
            kind: ErrorKind::Internal,
            message: detail.clone(),
            timestamp: self.clock.now(),
        };
        if let Err(e) = self.failure_sink.append(entry).await {
            error!(error = %e, "Failed to append to failure log");
        }

        JobReport {
            song_id,
            song_name: None,
            attempts: 0,
            outcome: JobOutcome::Failed {
                kind: ErrorKind::Internal,
                detail,
            },
        }
    }

    fn emit(&self, event: DownloadEvent) {
        self.events.emit(event).ok();
    }
}

/// Later writers replace earlier ones; make that visible.
fn warn_on_collisions(jobs: &[JobReport]) {
    let mut seen: HashMap<&Path, &str> = HashMap::new();

    for job in jobs {
        let JobOutcome::Success(downloaded) = &job.outcome else {
            continue;
        };
        if let Some(first) = seen.insert(downloaded.path.as_path(), job.song_id.as_str()) {
            warn!(
                path = %downloaded.path.display(),
                first = first,
                second = %job.song_id,
                "Two songs resolved to the same file, one overwrote the other"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_concurrency() {
        assert_eq!(clamp_concurrency(0), 1);
        assert_eq!(clamp_concurrency(1), 1);
        assert_eq!(clamp_concurrency(8), 8);
        assert_eq!(clamp_concurrency(50), 50);
        assert_eq!(clamp_concurrency(500), 50);
    }

    #[test]
    fn test_batch_options_builder() {
        let options = BatchOptions::default()
            .with_quality(QualityTier::Hires)
            .with_lyric_mode(LyricMode::EmbedAndFile)
            .with_concurrency(12);

        assert_eq!(options.quality, QualityTier::Hires);
        assert_eq!(options.lyric_mode, LyricMode::EmbedAndFile);
        assert_eq!(options.concurrency, 12);
        assert_eq!(BatchOptions::default().concurrency, DEFAULT_CONCURRENCY);
    }
}
