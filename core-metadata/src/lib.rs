//! # Metadata Module
//!
//! Prepares and embeds the descriptive side of a downloaded song.
//!
//! ## Overview
//!
//! This module handles:
//! - Lyric normalization into LRC text ([`lyrics`])
//! - Tag injection for MP3 (ID3v2) and FLAC (Vorbis comments) ([`tagging`])
//! - Cover art download ([`artwork`])

pub mod artwork;
pub mod error;
pub mod lyrics;
pub mod tagging;

pub use artwork::CoverArtFetcher;
pub use error::{MetadataError, Result};
pub use lyrics::normalize_lyrics;
pub use tagging::{
    writer_for, Id3v2TagWriter, LoftyTagInjector, TagInjector, TagWriter, TrackTags,
    VorbisCommentWriter,
};
