//! NCM API response types
//!
//! Envelopes are deserialized leniently (every field optional) so that the
//! connector can report exactly which expected key was missing.

use serde::Deserialize;
use std::fmt;

/// Identifier the API returns as either a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(u64),
    Text(String),
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawId::Number(n) => write!(f, "{}", n),
            RawId::Text(s) => f.write_str(s),
        }
    }
}

/// `GET /song/detail?ids=<id>`
#[derive(Debug, Deserialize)]
pub struct SongDetailResponse {
    pub songs: Option<Vec<SongRecord>>,
}

#[derive(Debug, Deserialize)]
pub struct SongRecord {
    pub id: Option<RawId>,
    pub name: Option<String>,
    #[serde(default)]
    pub ar: Vec<ArtistRecord>,
    pub al: Option<AlbumRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistRecord {
    pub id: Option<RawId>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AlbumRecord {
    pub id: Option<RawId>,
    pub name: Option<String>,
    #[serde(rename = "picUrl")]
    pub pic_url: Option<String>,
}

/// `GET /song/url/v1?id=<id>&level=<tier>`
#[derive(Debug, Deserialize)]
pub struct SongUrlResponse {
    pub data: Option<Vec<SongUrlRecord>>,
}

#[derive(Debug, Deserialize)]
pub struct SongUrlRecord {
    pub id: Option<RawId>,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub size: Option<u64>,
    pub level: Option<String>,
}

/// `GET /lyric/new?id=<id>`
#[derive(Debug, Deserialize)]
pub struct LyricResponse {
    pub lrc: Option<LyricBlock>,
}

#[derive(Debug, Deserialize)]
pub struct LyricBlock {
    pub lyric: Option<String>,
}

/// `GET /playlist/detail?id=<id>`
#[derive(Debug, Deserialize)]
pub struct PlaylistDetailResponse {
    pub playlist: Option<PlaylistRecord>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistRecord {
    pub name: Option<String>,
}

/// `GET /playlist/track/all?id=<id>`
#[derive(Debug, Deserialize)]
pub struct TrackListResponse {
    pub songs: Option<Vec<TrackRecord>>,
}

#[derive(Debug, Deserialize)]
pub struct TrackRecord {
    pub id: Option<RawId>,
}

/// `GET /album?id=<id>`
#[derive(Debug, Deserialize)]
pub struct AlbumResponse {
    pub album: Option<AlbumDetail>,
    pub songs: Option<Vec<TrackRecord>>,
}

#[derive(Debug, Deserialize)]
pub struct AlbumDetail {
    pub name: Option<String>,
    pub artist: Option<ArtistRecord>,
}

/// `GET /artist/album?id=<id>&limit=<n>&offset=<n>`
#[derive(Debug, Deserialize)]
pub struct ArtistAlbumsResponse {
    pub artist: Option<ArtistRecord>,
    #[serde(rename = "hotAlbums")]
    pub hot_albums: Option<Vec<AlbumSummary>>,
    #[serde(default)]
    pub more: bool,
}

#[derive(Debug, Deserialize)]
pub struct AlbumSummary {
    pub id: Option<RawId>,
    pub name: Option<String>,
}
