//! # Host Bridge Traits
//!
//! Seams between the download core and the outside world.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP requests and streamed downloads
//! - [`CatalogProvider`](catalog::CatalogProvider) - Remote music catalog reads
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! HTTP seams report [`BridgeError`](error::BridgeError); catalog seams
//! report [`CatalogError`](catalog::CatalogError), which a `BridgeError`
//! converts into as a transport failure.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` so one instance can be shared across
//! every job of a batch.

pub mod catalog;
pub mod error;
pub mod http;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use catalog::{
    CatalogError, CatalogProvider, CollectionGroup, CollectionKind, ContainerFormat,
    ExpandedCollection, QualityTier, ResolvedAudio, SkippedGroup, SongMetadata, SongRef,
};
pub use http::{DownloadStream, HttpClient, HttpRequest, HttpResponse, RetryPolicy};
pub use time::{Clock, FixedClock, LogLevel, SystemClock};
