//! Data types passed into and out of the download core.

use crate::error::ErrorKind;
use bridge_traits::catalog::{CollectionKind, SkippedGroup};
use chrono::{DateTime, SecondsFormat, Utc};
use core_runtime::events::JobStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// What the user asked to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadRequest {
    Song(String),
    Collection { kind: CollectionKind, id: String },
}

/// How lyrics are delivered. Embedding happens in both modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LyricMode {
    /// Lyrics only in the audio file's tag.
    #[default]
    Embed,
    /// Tag plus a sibling `.lrc` file.
    EmbedAndFile,
}

impl LyricMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LyricMode::Embed => "embed",
            LyricMode::EmbedAndFile => "file",
        }
    }

    pub fn writes_file(&self) -> bool {
        matches!(self, LyricMode::EmbedAndFile)
    }
}

impl FromStr for LyricMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "embed" => Ok(LyricMode::Embed),
            "2" | "file" | "embed_and_file" | "lrc" => Ok(LyricMode::EmbedAndFile),
            other => Err(format!("unknown lyric mode '{}'", other)),
        }
    }
}

impl fmt::Display for LyricMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stages of a download job, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobStage {
    FetchingMetadata,
    ResolvingUrl,
    FetchingLyrics,
    StreamingAudio,
    VerifyingIntegrity,
    InjectingTags,
    WritingLyricFile,
    Done,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::FetchingMetadata => "fetching_metadata",
            JobStage::ResolvingUrl => "resolving_url",
            JobStage::FetchingLyrics => "fetching_lyrics",
            JobStage::StreamingAudio => "streaming_audio",
            JobStage::VerifyingIntegrity => "verifying_integrity",
            JobStage::InjectingTags => "injecting_tags",
            JobStage::WritingLyricFile => "writing_lyric_file",
            JobStage::Done => "done",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the standalone lyric file step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LyricFileStatus {
    NotRequested,
    /// Requested, but the song has no lyrics.
    NoLyrics,
    Written(PathBuf),
    Failed(String),
}

/// A completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedSong {
    pub path: PathBuf,
    pub bytes: u64,
    pub lyric_file: LyricFileStatus,
    pub embedded_lyrics: bool,
    pub embedded_cover: bool,
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success(DownloadedSong),
    SkippedNoRights { reason: String },
    Failed { kind: ErrorKind, detail: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success(_))
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Success(_) => JobStatus::Succeeded,
            JobOutcome::SkippedNoRights { .. } => JobStatus::SkippedNoRights,
            JobOutcome::Failed { .. } => JobStatus::Failed,
        }
    }

    /// Human-readable detail for non-success outcomes.
    pub fn detail(&self) -> Option<String> {
        match self {
            JobOutcome::Success(_) => None,
            JobOutcome::SkippedNoRights { reason } => Some(reason.clone()),
            JobOutcome::Failed { kind, detail } => Some(format!("{}: {}", kind, detail)),
        }
    }
}

/// Per-job entry of a [`BatchReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub song_id: String,
    /// Title, once metadata was fetched.
    pub song_name: Option<String>,
    pub attempts: u32,
    pub outcome: JobOutcome,
}

/// Aggregate result of a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub batch_id: String,
    pub succeeded: usize,
    /// Song ids that did not succeed, in batch order.
    pub failed_ids: Vec<String>,
    pub jobs: Vec<JobReport>,
    pub skipped_groups: Vec<SkippedGroup>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.jobs.len()
    }

    pub fn failed(&self) -> usize {
        self.failed_ids.len()
    }

    pub fn job(&self, song_id: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|job| job.song_id == song_id)
    }
}

/// One record of the failure log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureLogEntry {
    pub song_id: String,
    pub song_name: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl FailureLogEntry {
    /// Multi-line text record, terminated by a blank line.
    ///
    /// The blank line is the only record separator. The name is kept on one
    /// line and further message lines are indented.
    pub fn to_record(&self) -> String {
        format!(
            "[{}] song {} ({})\nkind: {}\ndetail: {}\n\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.song_id,
            single_line(self.song_name.as_deref().unwrap_or("unknown")),
            self.kind,
            continuation_lines(&self.message)
        )
    }
}

fn single_line(text: &str) -> String {
    text.lines().map(str::trim).collect::<Vec<_>>().join(" ")
}

fn continuation_lines(text: &str) -> String {
    text.trim_end().lines().collect::<Vec<_>>().join("\n  ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_lyric_mode_parse() {
        assert_eq!("embed".parse::<LyricMode>(), Ok(LyricMode::Embed));
        assert_eq!("FILE".parse::<LyricMode>(), Ok(LyricMode::EmbedAndFile));
        assert_eq!("2".parse::<LyricMode>(), Ok(LyricMode::EmbedAndFile));
        assert!("karaoke".parse::<LyricMode>().is_err());
        assert!(LyricMode::EmbedAndFile.writes_file());
        assert!(!LyricMode::Embed.writes_file());
    }

    #[test]
    fn test_stages_are_ordered() {
        assert!(JobStage::FetchingMetadata < JobStage::ResolvingUrl);
        assert!(JobStage::StreamingAudio < JobStage::VerifyingIntegrity);
        assert!(JobStage::WritingLyricFile < JobStage::Done);
    }

    #[test]
    fn test_outcome_status_and_detail() {
        let skipped = JobOutcome::SkippedNoRights {
            reason: "no stream".to_string(),
        };
        assert_eq!(skipped.status(), JobStatus::SkippedNoRights);
        assert_eq!(skipped.detail().as_deref(), Some("no stream"));

        let failed = JobOutcome::Failed {
            kind: ErrorKind::Transport,
            detail: "timed out".to_string(),
        };
        assert_eq!(failed.detail().as_deref(), Some("Transport: timed out"));
        assert!(!failed.is_success());
    }

    #[test]
    fn test_failure_record_format() {
        let entry = FailureLogEntry {
            song_id: "3".to_string(),
            song_name: None,
            kind: ErrorKind::Transport,
            message: "Request timed out".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        };

        assert_eq!(
            entry.to_record(),
            "[2024-05-01T12:30:00Z] song 3 (unknown)\nkind: Transport\ndetail: Request timed out\n\n"
        );
    }

    #[test]
    fn test_failure_record_folds_embedded_newlines() {
        let entry = FailureLogEntry {
            song_id: "4".to_string(),
            song_name: Some("Two\nLines".to_string()),
            kind: ErrorKind::Transport,
            message: "API error (502): <html>\n\n<body>bad</body>\r\n".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        };

        let record = entry.to_record();
        assert_eq!(
            record,
            "[2024-05-01T12:30:00Z] song 4 (Two Lines)\nkind: Transport\ndetail: API error (502): <html>\n  \n  <body>bad</body>\n\n"
        );
        assert_eq!(record.split_terminator("\n\n").count(), 1);
    }
}
