//! Error types for the NCM catalog provider

use bridge_traits::catalog::CatalogError;
use thiserror::Error;

/// NCM provider errors
#[derive(Error, Debug)]
pub enum NcmError {
    /// The credential was rejected (HTTP 401/403 or envelope code 301)
    #[error("Credential rejected (status {status_code})")]
    Unauthorized { status_code: u16 },

    /// The requested resource does not exist
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// API returned a non-success status
    #[error("NCM API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Body was not the JSON we expected
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// A required envelope key was absent
    #[error("Response is missing `{field}`")]
    MissingField { field: &'static str },

    /// Well-formed response without a playable URL
    #[error("No stream URL for song {song_id}")]
    NoStream { song_id: String },

    /// Network error
    #[error(transparent)]
    BridgeError(#[from] bridge_traits::error::BridgeError),
}

/// Result type for NCM operations
pub type Result<T> = std::result::Result<T, NcmError>;

impl From<NcmError> for CatalogError {
    fn from(error: NcmError) -> Self {
        match error {
            NcmError::Unauthorized { .. } => CatalogError::Unauthorized(error.to_string()),
            NcmError::NotFound { what } => CatalogError::NotFound(what),
            NcmError::ApiError { .. } => CatalogError::Transport(error.to_string()),
            NcmError::ParseError(msg) => CatalogError::Malformed(msg),
            NcmError::MissingField { .. } => CatalogError::Malformed(error.to_string()),
            NcmError::NoStream { .. } => CatalogError::RightsRestricted(error.to_string()),
            NcmError::BridgeError(e) => CatalogError::Transport(e.to_string()),
        }
    }
}
