//! # NCM Catalog Provider
//!
//! Implements [`CatalogProvider`](bridge_traits::catalog::CatalogProvider)
//! for a NeteaseCloudMusicApi-compatible service.
//!
//! ## Overview
//!
//! This module provides:
//! - Song detail lookup (title, artist, album, cover URL)
//! - Stream URL resolution per quality tier, with rights-restriction detection
//! - Raw lyric retrieval
//! - Playlist, album and artist-catalog expansion grouped by output folder

pub mod connector;
pub mod error;
pub mod types;

pub use connector::NcmCatalogClient;
pub use error::{NcmError, Result};
