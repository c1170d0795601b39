//! # Tag Injector
//!
//! Embeds title, artist, album, lyrics and a front cover into a finished
//! audio file.
//!
//! One [`TagWriter`] exists per supported container. [`writer_for`] maps a
//! [`ContainerFormat`] onto its writer, and [`LoftyTagInjector`] picks the
//! format from the file extension and runs the writer on the blocking pool.
//!
//! Writers replace existing frames instead of appending, so injecting the
//! same tags twice leaves the file as a single injection would.

use crate::error::{MetadataError, Result};
use async_trait::async_trait;
use bridge_traits::catalog::{ContainerFormat, SongMetadata};
use bytes::Bytes;
use lofty::config::{ParseOptions, WriteOptions};
use lofty::file::{AudioFile, FileType, TaggedFileExt};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag, TagType};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Description stored alongside the embedded cover picture.
const COVER_DESCRIPTION: &str = "Cover";

/// Everything written into a file's tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Normalized lyric text; empty means "no lyrics".
    pub lyrics: String,
    /// JPEG front cover, if one could be fetched.
    pub cover: Option<Bytes>,
}

impl TrackTags {
    pub fn from_metadata(metadata: &SongMetadata, lyrics: String, cover: Option<Bytes>) -> Self {
        Self {
            title: metadata.title.clone(),
            artist: metadata.artist.clone(),
            album: metadata.album.clone(),
            lyrics,
            cover,
        }
    }
}

/// Format-specific tag writer.
pub trait TagWriter: Send + Sync {
    /// Container this writer handles.
    fn format(&self) -> ContainerFormat;

    /// Write `tags` into the file at `path`, in place.
    fn write(&self, path: &Path, tags: &TrackTags) -> Result<()>;
}

/// ID3v2 writer for MP3 files. Lyrics land in a USLT frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct Id3v2TagWriter;

impl TagWriter for Id3v2TagWriter {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Mp3
    }

    fn write(&self, path: &Path, tags: &TrackTags) -> Result<()> {
        write_with_lofty(path, FileType::Mpeg, TagType::Id3v2, tags)
    }
}

/// Vorbis comment writer for FLAC files. The cover becomes a PICTURE block.
#[derive(Debug, Default, Clone, Copy)]
pub struct VorbisCommentWriter;

impl TagWriter for VorbisCommentWriter {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Flac
    }

    fn write(&self, path: &Path, tags: &TrackTags) -> Result<()> {
        write_with_lofty(path, FileType::Flac, TagType::VorbisComments, tags)
    }
}

static ID3V2_WRITER: Id3v2TagWriter = Id3v2TagWriter;
static VORBIS_WRITER: VorbisCommentWriter = VorbisCommentWriter;

/// Select the writer for a container.
pub fn writer_for(format: ContainerFormat) -> Result<&'static dyn TagWriter> {
    match format {
        ContainerFormat::Mp3 => Ok(&ID3V2_WRITER),
        ContainerFormat::Flac => Ok(&VORBIS_WRITER),
        ContainerFormat::Unknown => Err(MetadataError::UnsupportedFormat(
            "no tag writer for this container".to_string(),
        )),
    }
}

fn write_with_lofty(
    path: &Path,
    expected: FileType,
    tag_type: TagType,
    tags: &TrackTags,
) -> Result<()> {
    let mut tagged_file = Probe::open(path)?
        .options(ParseOptions::new())
        .guess_file_type()?
        .read()?;

    // The extension picked the writer; the content has to agree.
    if tagged_file.file_type() != expected {
        return Err(MetadataError::UnsupportedFormat(format!(
            "{} holds {:?} data, expected {:?}",
            path.display(),
            tagged_file.file_type(),
            expected
        )));
    }

    let mut tag = tagged_file
        .remove(tag_type)
        .unwrap_or_else(|| Tag::new(tag_type));

    tag.set_title(tags.title.clone());
    tag.set_artist(tags.artist.clone());
    tag.set_album(tags.album.clone());

    if tags.lyrics.is_empty() {
        tag.remove_key(&ItemKey::Lyrics);
    } else {
        tag.insert_text(ItemKey::Lyrics, tags.lyrics.clone());
    }

    if let Some(cover) = &tags.cover {
        tag.remove_picture_type(PictureType::CoverFront);
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::Jpeg),
            Some(COVER_DESCRIPTION.to_string()),
            cover.to_vec(),
        ));
    }

    tagged_file.insert_tag(tag);
    tagged_file.save_to_path(path, WriteOptions::default())?;

    debug!(
        file_type = ?expected,
        has_cover = tags.cover.is_some(),
        has_lyrics = !tags.lyrics.is_empty(),
        "Tags written"
    );
    Ok(())
}

/// Async seam used by the download job.
#[async_trait]
pub trait TagInjector: Send + Sync {
    async fn inject(&self, path: &Path, tags: &TrackTags) -> Result<()>;
}

/// [`TagInjector`] backed by `lofty`, dispatching on the file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagInjector;

impl LoftyTagInjector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TagInjector for LoftyTagInjector {
    async fn inject(&self, path: &Path, tags: &TrackTags) -> Result<()> {
        let writer = writer_for(ContainerFormat::from_path(path))?;
        let path: PathBuf = path.to_path_buf();
        let tags = tags.clone();

        tokio::task::spawn_blocking(move || writer.write(&path, &tags))
            .await
            .map_err(|e| MetadataError::TagWrite(format!("tag writer task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_selection() {
        assert_eq!(
            writer_for(ContainerFormat::Mp3).unwrap().format(),
            ContainerFormat::Mp3
        );
        assert_eq!(
            writer_for(ContainerFormat::Flac).unwrap().format(),
            ContainerFormat::Flac
        );
        assert!(matches!(
            writer_for(ContainerFormat::Unknown),
            Err(MetadataError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_track_tags_from_metadata() {
        let metadata = SongMetadata {
            id: "1".to_string(),
            title: "Song".to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            cover_url: None,
        };

        let tags = TrackTags::from_metadata(&metadata, "[00:01.000]x".to_string(), None);
        assert_eq!(tags.title, "Song");
        assert_eq!(tags.lyrics, "[00:01.000]x");
        assert!(tags.cover.is_none());
    }

    #[tokio::test]
    async fn test_unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.ogg");
        std::fs::write(&path, b"OggS").unwrap();

        let tags = TrackTags {
            title: "t".to_string(),
            artist: "a".to_string(),
            album: "b".to_string(),
            lyrics: String::new(),
            cover: None,
        };

        let err = LoftyTagInjector::new().inject(&path, &tags).await.unwrap_err();
        assert!(matches!(err, MetadataError::UnsupportedFormat(_)));
    }
}
