//! # Download Core
//!
//! Batch download engine: per-song pipeline, retry policy, failure log and
//! the bounded-parallel orchestrator.
//!
//! ## Modules
//!
//! - [`orchestrator`] - expands requests and runs jobs with bounded parallelism
//! - [`job`] - the single-song pipeline and its retry loop
//! - [`failure_log`] - append-only failure sinks
//! - [`naming`] / [`destination`] - where files land
//! - [`models`] - outcomes, reports and log entries

pub mod destination;
pub mod error;
pub mod failure_log;
pub mod job;
pub mod models;
pub mod naming;
pub mod orchestrator;

pub use destination::{CollectionFolders, DestinationResolver};
pub use error::{DownloadError, ErrorKind, JobError, Result};
pub use failure_log::{FailureSink, FileFailureLog, MemoryFailureLog};
pub use job::{DownloadJob, JobSettings};
pub use models::{
    BatchReport, DownloadRequest, DownloadedSong, FailureLogEntry, JobOutcome, JobReport,
    JobStage, LyricFileStatus, LyricMode,
};
pub use orchestrator::{clamp_concurrency, BatchOptions, Orchestrator, DEFAULT_CONCURRENCY};
