use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    /// A structured lyric line could not be parsed.
    #[error("Malformed lyric line {line}: {reason}")]
    MalformedLyrics { line: usize, reason: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to write tags: {0}")]
    TagWrite(String),

    #[error("Artwork fetch failed: {0}")]
    ArtworkError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),
}

impl From<lofty::error::LoftyError> for MetadataError {
    fn from(error: lofty::error::LoftyError) -> Self {
        MetadataError::TagWrite(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
