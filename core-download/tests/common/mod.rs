//! Hand-written fakes shared by the download integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::catalog::{
    CatalogError, CatalogProvider, CollectionKind, ContainerFormat, ExpandedCollection,
    QualityTier, ResolvedAudio, SongMetadata,
};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{DownloadStream, HttpClient, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_metadata::tagging::{TagInjector, TrackTags};
use core_metadata::MetadataError;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};

pub fn stream_url(id: &str) -> String {
    format!("http://cdn.test/{}.mp3", id)
}

pub fn metadata(id: &str) -> SongMetadata {
    SongMetadata {
        id: id.to_string(),
        title: format!("Song {}", id),
        artist: "Artist".to_string(),
        album: "Album".to_string(),
        cover_url: None,
    }
}

/// `Album - Song <id> - Artist.mp3`
pub fn file_name(id: &str) -> String {
    format!("Album - Song {} - Artist.mp3", id)
}

// =============================================================================
// Catalog
// =============================================================================

/// How URL resolution behaves for one song.
#[derive(Debug, Clone)]
pub enum UrlScript {
    Stream { size: Option<u64> },
    NoRights,
    Malformed,
}

#[derive(Default)]
pub struct ScriptedCatalog {
    songs: HashMap<String, SongMetadata>,
    urls: HashMap<String, UrlScript>,
    lyrics: HashMap<String, String>,
    failing_lyrics: Vec<String>,
    collections: HashMap<String, ExpandedCollection>,
    metadata_calls: Mutex<HashMap<String, u32>>,
    resolve_calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A song whose stream URL is [`stream_url`].
    pub fn with_song(mut self, id: &str, url: UrlScript) -> Self {
        self.songs.insert(id.to_string(), metadata(id));
        self.urls.insert(id.to_string(), url);
        self
    }

    pub fn with_metadata(mut self, meta: SongMetadata) -> Self {
        self.songs.insert(meta.id.clone(), meta);
        self
    }

    pub fn with_lyrics(mut self, id: &str, raw: &str) -> Self {
        self.lyrics.insert(id.to_string(), raw.to_string());
        self
    }

    pub fn with_failing_lyrics(mut self, id: &str) -> Self {
        self.failing_lyrics.push(id.to_string());
        self
    }

    pub fn with_collection(mut self, id: &str, collection: ExpandedCollection) -> Self {
        self.collections.insert(id.to_string(), collection);
        self
    }

    pub fn metadata_calls(&self, id: &str) -> u32 {
        *self.metadata_calls.lock().unwrap().get(id).unwrap_or(&0)
    }

    pub fn resolve_calls(&self, id: &str) -> u32 {
        *self.resolve_calls.lock().unwrap().get(id).unwrap_or(&0)
    }
}

#[async_trait]
impl CatalogProvider for ScriptedCatalog {
    async fn fetch_song_metadata(&self, id: &str) -> Result<SongMetadata, CatalogError> {
        *self
            .metadata_calls
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_insert(0) += 1;

        self.songs
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("song {}", id)))
    }

    async fn resolve_download_url(
        &self,
        id: &str,
        _tier: QualityTier,
    ) -> Result<ResolvedAudio, CatalogError> {
        *self
            .resolve_calls
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_insert(0) += 1;

        match self.urls.get(id) {
            Some(UrlScript::Stream { size }) => Ok(ResolvedAudio {
                url: stream_url(id),
                container: ContainerFormat::Mp3,
                size: *size,
                level: Some("exhigh".to_string()),
            }),
            Some(UrlScript::NoRights) => Err(CatalogError::RightsRestricted(format!(
                "No stream URL for song {}",
                id
            ))),
            Some(UrlScript::Malformed) => {
                Err(CatalogError::Malformed("Response is missing `data`".to_string()))
            }
            None => Err(CatalogError::NotFound(format!("song {}", id))),
        }
    }

    async fn fetch_lyrics(&self, id: &str) -> Result<String, CatalogError> {
        if self.failing_lyrics.iter().any(|f| f == id) {
            return Err(CatalogError::Transport("lyric request timed out".to_string()));
        }
        Ok(self.lyrics.get(id).cloned().unwrap_or_default())
    }

    async fn expand_collection(
        &self,
        kind: CollectionKind,
        id: &str,
    ) -> Result<ExpandedCollection, CatalogError> {
        self.collections
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("{} {}", kind, id)))
    }
}

// =============================================================================
// HTTP
// =============================================================================

/// One scripted response of the audio stream.
#[derive(Debug, Clone)]
pub enum StreamStep {
    /// Full body, declared length equal to its size.
    Body(Vec<u8>),
    /// Body with an explicit declared length (or none).
    Declared { body: Vec<u8>, length: Option<u64> },
    /// Connection breaks after `delivered` bytes.
    Break { delivered: Vec<u8>, declared: u64 },
    Timeout,
}

#[derive(Default)]
pub struct FakeHttp {
    streams: HashMap<String, Vec<StreamStep>>,
    covers: HashMap<String, Vec<u8>>,
    stream_calls: Mutex<HashMap<String, usize>>,
    stream_delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    watched: Mutex<Option<PathBuf>>,
    watched_existed: Mutex<Vec<bool>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Responses for successive stream requests of song `id`; the last step
    /// repeats.
    pub fn with_stream(mut self, id: &str, steps: Vec<StreamStep>) -> Self {
        self.streams.insert(stream_url(id), steps);
        self
    }

    pub fn with_cover(mut self, url: &str, data: &[u8]) -> Self {
        self.covers.insert(url.to_string(), data.to_vec());
        self
    }

    /// Hold every stream request open for `delay` before answering.
    pub fn with_stream_delay(mut self, delay: Duration) -> Self {
        self.stream_delay = Some(delay);
        self
    }

    /// Record whether `path` exists each time a stream is opened.
    pub fn watch_path(&self, path: &Path) {
        *self.watched.lock().unwrap() = Some(path.to_path_buf());
    }

    pub fn watched_existed(&self) -> Vec<bool> {
        self.watched_existed.lock().unwrap().clone()
    }

    pub fn stream_calls(&self, id: &str) -> usize {
        *self.stream_calls.lock().unwrap().get(&stream_url(id)).unwrap_or(&0)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        match self.covers.get(&request.url) {
            Some(data) => Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from(data.clone()),
            }),
            None => Ok(HttpResponse {
                status: 404,
                headers: HashMap::new(),
                body: Bytes::new(),
            }),
        }
    }

    async fn download_stream(&self, request: HttpRequest) -> BridgeResult<DownloadStream> {
        let call = {
            let mut calls = self.stream_calls.lock().unwrap();
            let count = calls.entry(request.url.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if let Some(path) = self.watched.lock().unwrap().as_ref() {
            self.watched_existed.lock().unwrap().push(path.exists());
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.stream_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let steps = self
            .streams
            .get(&request.url)
            .ok_or_else(|| BridgeError::OperationFailed(format!("HTTP 404 for {}", request.url)))?;
        let step = steps
            .get(call - 1)
            .or_else(|| steps.last())
            .cloned()
            .ok_or_else(|| BridgeError::OperationFailed("no scripted response".to_string()))?;

        match step {
            StreamStep::Body(body) => {
                let length = body.len() as u64;
                Ok(DownloadStream::new(
                    Some(length),
                    Box::new(io::Cursor::new(body)),
                ))
            }
            StreamStep::Declared { body, length } => {
                Ok(DownloadStream::new(length, Box::new(io::Cursor::new(body))))
            }
            StreamStep::Break { delivered, declared } => Ok(DownloadStream::new(
                Some(declared),
                Box::new(BrokenReader {
                    data: delivered,
                    pos: 0,
                }),
            )),
            StreamStep::Timeout => Err(BridgeError::Timeout(format!(
                "Request timed out: {}",
                request.url
            ))),
        }
    }
}

/// Yields its data, then fails like a reset connection.
struct BrokenReader {
    data: Vec<u8>,
    pos: usize,
}

impl AsyncRead for BrokenReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.pos < this.data.len() {
            let n = (this.data.len() - this.pos).min(buf.remaining());
            buf.put_slice(&this.data[this.pos..this.pos + n]);
            this.pos += n;
            return Poll::Ready(Ok(()));
        }
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )))
    }
}

// =============================================================================
// Tags
// =============================================================================

/// Records injections instead of touching files.
#[derive(Default)]
pub struct RecordingInjector {
    calls: Mutex<Vec<(PathBuf, TrackTags)>>,
    fail: bool,
}

impl RecordingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, TrackTags)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TagInjector for RecordingInjector {
    async fn inject(&self, path: &Path, tags: &TrackTags) -> Result<(), MetadataError> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), tags.clone()));
        if self.fail {
            return Err(MetadataError::TagWrite("frame too large".to_string()));
        }
        Ok(())
    }
}

/// MPEG-1 Layer III frames (128 kbps, 44.1 kHz), 417 bytes each.
pub fn mp3_bytes(frames: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(frames * 417);
    for _ in 0..frames {
        let mut frame = vec![0u8; 417];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        data.extend_from_slice(&frame);
    }
    data
}
