//! NCM API connector implementation
//!
//! Implements [`CatalogProvider`] against a NeteaseCloudMusicApi-compatible
//! HTTP service.

use async_trait::async_trait;
use bridge_traits::catalog::{
    self, CatalogProvider, CollectionGroup, CollectionKind, ContainerFormat, ExpandedCollection,
    QualityTier, ResolvedAudio, SkippedGroup, SongMetadata, SongRef,
};
use bridge_traits::http::{HttpClient, HttpRequest};
use core_runtime::config::DownloaderConfig;
use core_runtime::logging::redact_if_sensitive;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{NcmError, Result};
use crate::types::{
    AlbumResponse, ArtistAlbumsResponse, LyricResponse, PlaylistDetailResponse, RawId,
    SongDetailResponse, SongUrlResponse, TrackListResponse, TrackRecord,
};

/// Page size for artist album listings
const ARTIST_ALBUM_PAGE_SIZE: u32 = 100;

/// Hard stop for artist paging in case the API keeps reporting `more`
const MAX_ARTIST_PAGES: u32 = 50;

/// Envelope code the API uses for "login required"
const CODE_NEEDS_LOGIN: i64 = 301;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// NCM catalog client
///
/// Every request carries the session credential as a `Cookie` header and a
/// per-request timeout. Nothing here retries; the download job owns the
/// retry budget.
///
/// # Example
///
/// ```ignore
/// use provider_ncm::NcmCatalogClient;
/// use bridge_traits::catalog::CatalogProvider;
///
/// let client = NcmCatalogClient::new(http_client, "http://localhost:3000", cookie);
/// let song = client.fetch_song_metadata("186016").await?;
/// ```
pub struct NcmCatalogClient {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    credential: String,
    timeout: Duration,
}

impl NcmCatalogClient {
    /// Create a new client
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `base_url` - API root, e.g. `http://localhost:3000`
    /// * `credential` - session cookie passed through unchanged
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credential: credential.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build a client from validated downloader settings
    pub fn from_config(http_client: Arc<dyn HttpClient>, config: &DownloaderConfig) -> Self {
        Self::new(
            http_client,
            config.api_base_url.clone(),
            config.credential.clone(),
        )
        .with_timeout(config.request_timeout)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> String {
        let query = query
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}/{}?{}", self.base_url, path.trim_start_matches('/'), query)
    }

    /// GET `url`, map the status and envelope code, then decode into `T`.
    #[instrument(skip(self, url), fields(endpoint = %self.strip_base(&url)))]
    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let request = HttpRequest::get(url.clone())
            .cookie(self.credential.clone())
            .header("Accept", "application/json")
            .timeout(self.timeout);

        let response = self.http_client.execute(request).await?;

        match response.status {
            200..=299 => {}
            401 | 403 => {
                warn!(
                    status = response.status,
                    cookie = %redact_if_sensitive("cookie", &self.credential),
                    "Credential rejected"
                );
                return Err(NcmError::Unauthorized {
                    status_code: response.status,
                });
            }
            404 => {
                return Err(NcmError::NotFound {
                    what: format!("HTTP 404 for {}", self.strip_base(&url)),
                });
            }
            status => {
                warn!(status, "API request failed");
                return Err(NcmError::ApiError {
                    status_code: status,
                    message: String::from_utf8_lossy(&response.body)
                        .chars()
                        .take(200)
                        .collect(),
                });
            }
        }

        let value: Value = serde_json::from_slice(&response.body)
            .map_err(|e| NcmError::ParseError(format!("Invalid JSON body: {}", e)))?;

        check_envelope_code(&value)?;

        serde_json::from_value(value)
            .map_err(|e| NcmError::ParseError(format!("Unexpected response shape: {}", e)))
    }

    fn strip_base<'a>(&self, url: &'a str) -> &'a str {
        url.strip_prefix(&self.base_url).unwrap_or(url)
    }

    async fn song_detail(&self, id: &str) -> Result<SongMetadata> {
        let url = self.endpoint("song/detail", &[("ids", id)]);
        let response: SongDetailResponse = self.get_json(url).await?;

        let songs = response
            .songs
            .ok_or(NcmError::MissingField { field: "songs" })?;
        let song = songs.into_iter().next().ok_or_else(|| NcmError::NotFound {
            what: format!("song {}", id),
        })?;

        let title = song
            .name
            .ok_or(NcmError::MissingField { field: "songs[0].name" })?;
        let artist = song
            .ar
            .into_iter()
            .next()
            .and_then(|artist| artist.name)
            .ok_or(NcmError::MissingField {
                field: "songs[0].ar[0].name",
            })?;
        let album = song.al.ok_or(NcmError::MissingField { field: "songs[0].al" })?;
        let album_name = album.name.ok_or(NcmError::MissingField {
            field: "songs[0].al.name",
        })?;

        Ok(SongMetadata {
            id: song.id.map(|id| id.to_string()).unwrap_or_else(|| id.to_string()),
            title,
            artist,
            album: album_name,
            cover_url: album.pic_url.filter(|url| !url.is_empty()),
        })
    }

    async fn song_url(&self, id: &str, tier: QualityTier) -> Result<ResolvedAudio> {
        let url = self.endpoint("song/url/v1", &[("id", id), ("level", tier.as_str())]);
        let response: SongUrlResponse = self.get_json(url).await?;

        let record = response
            .data
            .ok_or(NcmError::MissingField { field: "data" })?
            .into_iter()
            .next()
            .ok_or(NcmError::MissingField { field: "data[0]" })?;

        let stream_url = record
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| NcmError::NoStream {
                song_id: id.to_string(),
            })?;

        Ok(ResolvedAudio {
            url: stream_url,
            container: ContainerFormat::from_api_type(record.kind.as_deref()),
            size: record.size.filter(|size| *size > 0),
            level: record.level,
        })
    }

    async fn lyric(&self, id: &str) -> Result<String> {
        let url = self.endpoint("lyric/new", &[("id", id)]);
        let response: LyricResponse = self.get_json(url).await?;

        Ok(response
            .lrc
            .and_then(|block| block.lyric)
            .unwrap_or_default())
    }

    async fn playlist(&self, id: &str) -> Result<ExpandedCollection> {
        let detail: PlaylistDetailResponse = self
            .get_json(self.endpoint("playlist/detail", &[("id", id)]))
            .await?;
        let title = detail
            .playlist
            .ok_or(NcmError::MissingField { field: "playlist" })?
            .name
            .unwrap_or_else(|| format!("playlist {}", id));

        let tracks: TrackListResponse = self
            .get_json(self.endpoint("playlist/track/all", &[("id", id)]))
            .await?;
        let songs = song_refs(
            tracks
                .songs
                .ok_or(NcmError::MissingField { field: "songs" })?,
        )?;

        info!(playlist = %title, count = songs.len(), "Expanded playlist");

        Ok(ExpandedCollection {
            title: title.clone(),
            groups: vec![CollectionGroup { name: title, songs }],
            skipped: Vec::new(),
        })
    }

    /// Album name, album artist name and its ordered tracks.
    async fn album_tracks(&self, id: &str) -> Result<(String, Option<String>, Vec<SongRef>)> {
        let response: AlbumResponse = self.get_json(self.endpoint("album", &[("id", id)])).await?;

        let album = response
            .album
            .ok_or(NcmError::MissingField { field: "album" })?;
        let name = album.name.unwrap_or_else(|| format!("album {}", id));
        let artist = album.artist.and_then(|artist| artist.name);
        let songs = song_refs(
            response
                .songs
                .ok_or(NcmError::MissingField { field: "songs" })?,
        )?;

        Ok((name, artist, songs))
    }

    async fn album(&self, id: &str) -> Result<ExpandedCollection> {
        let (name, _, songs) = self.album_tracks(id).await?;

        info!(album = %name, count = songs.len(), "Expanded album");

        Ok(ExpandedCollection {
            title: name.clone(),
            groups: vec![CollectionGroup { name, songs }],
            skipped: Vec::new(),
        })
    }

    async fn artist_catalog(&self, id: &str) -> Result<ExpandedCollection> {
        let mut artist_name: Option<String> = None;
        let mut albums: Vec<(String, String)> = Vec::new();
        let mut offset = 0u32;

        for _ in 0..MAX_ARTIST_PAGES {
            let limit = ARTIST_ALBUM_PAGE_SIZE.to_string();
            let offset_param = offset.to_string();
            let url = self.endpoint(
                "artist/album",
                &[("id", id), ("limit", &limit), ("offset", &offset_param)],
            );
            let page: ArtistAlbumsResponse = self.get_json(url).await?;

            if artist_name.is_none() {
                artist_name = page.artist.and_then(|artist| artist.name);
            }

            let page_albums = page
                .hot_albums
                .ok_or(NcmError::MissingField { field: "hotAlbums" })?;
            let page_len = page_albums.len();

            for summary in page_albums {
                let Some(album_id) = summary.id else {
                    warn!(artist_id = %id, "Skipping album without id");
                    continue;
                };
                let album_id = album_id.to_string();
                let name = summary
                    .name
                    .unwrap_or_else(|| format!("album {}", album_id));
                albums.push((album_id, name));
            }

            if !page.more || page_len == 0 {
                break;
            }
            offset += ARTIST_ALBUM_PAGE_SIZE;
        }

        let artist_name = artist_name.unwrap_or_else(|| format!("artist {}", id));
        debug!(artist = %artist_name, albums = albums.len(), "Listed artist albums");

        let mut groups = Vec::new();
        let mut skipped = Vec::new();

        for (album_id, album_name) in albums {
            let group_name = format!("{} - {}", artist_name, album_name);
            match self.album_tracks(&album_id).await {
                Ok((_, _, songs)) if songs.is_empty() => {
                    warn!(album_id = %album_id, "Album has no tracks, skipping");
                    skipped.push(SkippedGroup {
                        id: album_id,
                        name: group_name,
                        reason: "empty track list".to_string(),
                    });
                }
                Ok((_, _, songs)) => groups.push(CollectionGroup {
                    name: group_name,
                    songs,
                }),
                Err(e) => {
                    warn!(album_id = %album_id, error = %e, "Album expansion failed, skipping");
                    skipped.push(SkippedGroup {
                        id: album_id,
                        name: group_name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            artist = %artist_name,
            groups = groups.len(),
            skipped = skipped.len(),
            "Expanded artist catalog"
        );

        Ok(ExpandedCollection {
            title: artist_name,
            groups,
            skipped,
        })
    }
}

/// Reject envelopes whose `code` signals failure despite HTTP 200.
fn check_envelope_code(value: &Value) -> Result<()> {
    if !value.is_object() {
        return Err(NcmError::ParseError(
            "Response body is not a JSON object".to_string(),
        ));
    }

    match value.get("code").and_then(Value::as_i64) {
        None | Some(200) => Ok(()),
        Some(CODE_NEEDS_LOGIN) => Err(NcmError::Unauthorized {
            status_code: CODE_NEEDS_LOGIN as u16,
        }),
        Some(404) => Err(NcmError::NotFound {
            what: envelope_message(value).unwrap_or_else(|| "resource".to_string()),
        }),
        Some(code) => Err(NcmError::ApiError {
            status_code: u16::try_from(code).unwrap_or(0),
            message: envelope_message(value).unwrap_or_else(|| format!("API code {}", code)),
        }),
    }
}

fn envelope_message(value: &Value) -> Option<String> {
    value
        .get("message")
        .or_else(|| value.get("msg"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn song_refs(records: Vec<TrackRecord>) -> Result<Vec<SongRef>> {
    records
        .into_iter()
        .map(|record| {
            record
                .id
                .map(|id: RawId| SongRef::new(id.to_string()))
                .ok_or(NcmError::MissingField { field: "songs[].id" })
        })
        .collect()
}

#[async_trait]
impl CatalogProvider for NcmCatalogClient {
    #[instrument(skip(self))]
    async fn fetch_song_metadata(&self, id: &str) -> catalog::Result<SongMetadata> {
        Ok(self.song_detail(id).await?)
    }

    #[instrument(skip(self), fields(level = %tier))]
    async fn resolve_download_url(
        &self,
        id: &str,
        tier: QualityTier,
    ) -> catalog::Result<ResolvedAudio> {
        Ok(self.song_url(id, tier).await?)
    }

    #[instrument(skip(self))]
    async fn fetch_lyrics(&self, id: &str) -> catalog::Result<String> {
        Ok(self.lyric(id).await?)
    }

    #[instrument(skip(self))]
    async fn expand_collection(
        &self,
        kind: CollectionKind,
        id: &str,
    ) -> catalog::Result<ExpandedCollection> {
        let expanded = match kind {
            CollectionKind::Playlist => self.playlist(id).await,
            CollectionKind::Album => self.album(id).await,
            CollectionKind::ArtistCatalog => self.artist_catalog(id).await,
        };
        Ok(expanded?)
    }
}
