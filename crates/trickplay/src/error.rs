#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TrickPlayError {
    #[error("Playlist parse error: {0}")]
    ParseError(String),
    #[error("Unexpected playlist: {0}")]
    UnexpectedPlaylist(String),
    #[error("Invalid subset factor: {0}")]
    InvalidSubset(String),
    #[error("Curation not initialized for {0}")]
    NotInitialized(String),
    #[error("Invalid URI: {0}")]
    InvalidUri(String),
}

impl From<url::ParseError> for TrickPlayError {
    fn from(err: url::ParseError) -> Self {
        TrickPlayError::InvalidUri(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrickPlayError>;
