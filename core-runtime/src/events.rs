//! # Event Bus System
//!
//! Progress and state-change notifications for a download batch, published
//! over `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The orchestrator and its jobs emit [`DownloadEvent`]s; front ends subscribe
//! and render them. Emitting with no subscribers is harmless: the send error
//! is ignored by emitters.
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐    subscribe    ┌──────────┐
//! │ Orchestrator ├──────────────>│           ├────────────────>│   CLI    │
//! └──────────────┘               │ EventBus  │                 └──────────┘
//! ┌──────────────┐     emit      │           │    subscribe    ┌──────────┐
//! │ Download Job ├──────────────>│           ├────────────────>│  Tests   │
//! └──────────────┘               └───────────┘                 └──────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{DownloadEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(DownloadEvent::JobStarted { song_id: "42".to_string() }).ok();
//!
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.description(), "Job started");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events (progress
//!   bursts); it can keep receiving.
//! - **`RecvError::Closed`**: every sender is gone; the batch is over.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Terminal status of one job as reported to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    SkippedNoRights,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Succeeded => "done",
            JobStatus::SkippedNoRights => "skipped (no rights)",
            JobStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Events emitted while a batch runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    /// Batch accepted; `total` jobs will run.
    BatchStarted { batch_id: String, total: usize },
    /// A job has been scheduled onto a worker.
    JobStarted { song_id: String },
    /// Audio streaming began for a job.
    FileStarted {
        song_id: String,
        file_name: String,
        total_bytes: Option<u64>,
    },
    /// Bytes written so far for a job's current attempt.
    Progress {
        song_id: String,
        bytes_written: u64,
        total_bytes: Option<u64>,
    },
    /// An attempt failed with a retryable error.
    JobRetrying {
        song_id: String,
        attempt: u32,
        reason: String,
    },
    /// A job reached its terminal outcome.
    JobFinished {
        song_id: String,
        status: JobStatus,
        detail: Option<String>,
    },
    /// A sub-collection (e.g. one album of an artist) was not downloaded.
    GroupSkipped { name: String, reason: String },
    /// Every job has finished.
    BatchCompleted {
        batch_id: String,
        succeeded: usize,
        failed: usize,
    },
}

impl DownloadEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            DownloadEvent::BatchStarted { .. } => "Batch started",
            DownloadEvent::JobStarted { .. } => "Job started",
            DownloadEvent::FileStarted { .. } => "Streaming audio",
            DownloadEvent::Progress { .. } => "Download progress",
            DownloadEvent::JobRetrying { .. } => "Retrying job",
            DownloadEvent::JobFinished { .. } => "Job finished",
            DownloadEvent::GroupSkipped { .. } => "Group skipped",
            DownloadEvent::BatchCompleted { .. } => "Batch completed",
        }
    }

    /// Song the event concerns, if any.
    pub fn song_id(&self) -> Option<&str> {
        match self {
            DownloadEvent::JobStarted { song_id }
            | DownloadEvent::FileStarted { song_id, .. }
            | DownloadEvent::Progress { song_id, .. }
            | DownloadEvent::JobRetrying { song_id, .. }
            | DownloadEvent::JobFinished { song_id, .. } => Some(song_id),
            _ => None,
        }
    }

    /// Whole-percent progress for `Progress` events with a known length.
    pub fn percent(&self) -> Option<u8> {
        match self {
            DownloadEvent::Progress {
                bytes_written,
                total_bytes: Some(total),
                ..
            } if *total > 0 => Some((((*bytes_written).min(*total) * 100) / *total) as u8),
            _ => None,
        }
    }
}

/// Central event bus for broadcasting download events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DownloadEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls more than `capacity` events behind receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: DownloadEvent) -> Result<usize, SendError<DownloadEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<DownloadEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&DownloadEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{DownloadEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let finished_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, DownloadEvent::JobFinished { .. }));
/// ```
pub struct EventStream {
    receiver: Receiver<DownloadEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<DownloadEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&DownloadEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    pub async fn recv(&mut self) -> Result<DownloadEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(id: &str) -> DownloadEvent {
        DownloadEvent::JobFinished {
            song_id: id.to_string(),
            status: JobStatus::Succeeded,
            detail: None,
        }
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(finished("1")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        assert_eq!(bus.emit(finished("7")).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), finished("7"));
        assert_eq!(sub2.recv().await.unwrap(), finished("7"));
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|e| matches!(e, DownloadEvent::JobFinished { .. }));

        bus.emit(DownloadEvent::JobStarted {
            song_id: "1".to_string(),
        })
        .unwrap();
        bus.emit(finished("1")).unwrap();

        let event = stream.recv().await.unwrap();
        assert_eq!(event, finished("1"));
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(finished(&i.to_string())).unwrap();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_progress_percent() {
        let event = DownloadEvent::Progress {
            song_id: "1".to_string(),
            bytes_written: 512,
            total_bytes: Some(2048),
        };
        assert_eq!(event.percent(), Some(25));
        assert_eq!(event.song_id(), Some("1"));

        let unknown = DownloadEvent::Progress {
            song_id: "1".to_string(),
            bytes_written: 512,
            total_bytes: None,
        };
        assert_eq!(unknown.percent(), None);
    }

    #[test]
    fn test_event_serialization() {
        let event = DownloadEvent::GroupSkipped {
            name: "Artist - Album".to_string(),
            reason: "empty track list".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"GroupSkipped\""));

        let back: DownloadEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
