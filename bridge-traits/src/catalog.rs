//! Music Catalog Abstraction
//!
//! Read-only access to a remote music catalog: song detail, stream URL
//! resolution, lyric payloads and collection expansion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::error::BridgeError;

/// Identifier of a single song in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SongRef {
    pub id: String,
}

impl SongRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for SongRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Descriptive fields used for naming and tagging a downloaded song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongMetadata {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub cover_url: Option<String>,
}

/// Audio container of a resolved stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerFormat {
    Mp3,
    Flac,
    /// Format the catalog reported but we do not recognise.
    Unknown,
}

impl ContainerFormat {
    /// File extension written for this container. Unrecognised formats are
    /// saved with the MP3 extension.
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Flac => "flac",
            ContainerFormat::Mp3 | ContainerFormat::Unknown => "mp3",
        }
    }

    /// Map the catalog's `type` token onto a container.
    pub fn from_api_type(token: Option<&str>) -> Self {
        match token.map(|t| t.trim().to_ascii_lowercase()) {
            Some(t) if t == "mp3" => ContainerFormat::Mp3,
            Some(t) if t == "flac" => ContainerFormat::Flac,
            _ => ContainerFormat::Unknown,
        }
    }

    /// Detect the container from a file's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("mp3") => ContainerFormat::Mp3,
            Some("flac") => ContainerFormat::Flac,
            _ => ContainerFormat::Unknown,
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerFormat::Mp3 => "MP3",
            ContainerFormat::Flac => "FLAC",
            ContainerFormat::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A stream location resolved for one song at one quality tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAudio {
    pub url: String,
    pub container: ContainerFormat,
    /// Byte length the catalog advertises for the payload, if any.
    pub size: Option<u64>,
    /// Tier the catalog actually granted, which may be lower than requested.
    pub level: Option<String>,
}

/// Requested audio fidelity, lowest first.
///
/// The catalog defines what each tier means; this type only carries the
/// token forwarded in the URL-resolution request.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Standard,
    Higher,
    #[default]
    Exhigh,
    Lossless,
    Hires,
    Jyeffect,
    Sky,
    Jymaster,
}

impl QualityTier {
    pub const ALL: [QualityTier; 8] = [
        QualityTier::Standard,
        QualityTier::Higher,
        QualityTier::Exhigh,
        QualityTier::Lossless,
        QualityTier::Hires,
        QualityTier::Jyeffect,
        QualityTier::Sky,
        QualityTier::Jymaster,
    ];

    /// Token sent as the `level` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Standard => "standard",
            QualityTier::Higher => "higher",
            QualityTier::Exhigh => "exhigh",
            QualityTier::Lossless => "lossless",
            QualityTier::Hires => "hires",
            QualityTier::Jyeffect => "jyeffect",
            QualityTier::Sky => "sky",
            QualityTier::Jymaster => "jymaster",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QualityTier::Standard => "Standard",
            QualityTier::Higher => "Higher",
            QualityTier::Exhigh => "Extremely high (HQ)",
            QualityTier::Lossless => "Lossless (SQ)",
            QualityTier::Hires => "Hi-Res",
            QualityTier::Jyeffect => "Surround (spatial)",
            QualityTier::Sky => "Immersive surround",
            QualityTier::Jymaster => "Master",
        }
    }

    /// 1-based position in [`QualityTier::ALL`].
    pub fn ordinal(&self) -> usize {
        *self as usize + 1
    }

    pub fn from_ordinal(n: usize) -> Option<Self> {
        n.checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = String;

    /// Accepts either the tier token (`"lossless"`) or its ordinal (`"4"`).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<usize>() {
            return Self::from_ordinal(n)
                .ok_or_else(|| format!("quality ordinal must be 1-8, got {}", n));
        }
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|tier| tier.as_str() == lower)
            .ok_or_else(|| format!("unknown quality tier '{}'", s))
    }
}

/// Kind of multi-song collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Playlist,
    Album,
    ArtistCatalog,
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollectionKind::Playlist => "playlist",
            CollectionKind::Album => "album",
            CollectionKind::ArtistCatalog => "artist",
        };
        f.write_str(name)
    }
}

/// Songs of one output folder, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionGroup {
    pub name: String,
    pub songs: Vec<SongRef>,
}

/// A sub-collection that could not be expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedGroup {
    pub id: String,
    pub name: String,
    pub reason: String,
}

/// Result of expanding a playlist, album or artist catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedCollection {
    pub title: String,
    pub groups: Vec<CollectionGroup>,
    pub skipped: Vec<SkippedGroup>,
}

impl ExpandedCollection {
    /// All songs across groups, preserving group order.
    pub fn song_refs(&self) -> Vec<SongRef> {
        self.groups
            .iter()
            .flat_map(|group| group.songs.iter().cloned())
            .collect()
    }

    pub fn total_songs(&self) -> usize {
        self.groups.iter().map(|group| group.songs.len()).sum()
    }
}

/// Catalog failures.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No accessible stream: {0}")]
    RightsRestricted(String),

    #[error("Collection expansion failed: {0}")]
    CollectionExpansion(String),
}

impl From<BridgeError> for CatalogError {
    fn from(err: BridgeError) -> Self {
        CatalogError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Catalog provider trait
///
/// All operations carry the provider's credential; none of them retry.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Fetch descriptive metadata for one song.
    async fn fetch_song_metadata(&self, id: &str) -> Result<SongMetadata>;

    /// Resolve the stream location for `id` at `tier`.
    ///
    /// A well-formed response with no URL is [`CatalogError::RightsRestricted`].
    async fn resolve_download_url(&self, id: &str, tier: QualityTier) -> Result<ResolvedAudio>;

    /// Raw lyric payload; an empty string when the song has none.
    async fn fetch_lyrics(&self, id: &str) -> Result<String>;

    /// Expand a collection into song references grouped by output folder.
    async fn expand_collection(&self, kind: CollectionKind, id: &str)
        -> Result<ExpandedCollection>;
}
