//! Error taxonomy for decoding, fetching and persistence.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected 1 or 2 types, found {found}")]
    TypeCount { found: usize },

    #[error("expected 6 base stats, found {found}")]
    MissingStats { found: usize },

    #[error("missing {0} sprite url")]
    MissingSprite(&'static str),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },

    #[error("could not decode record #{id}: {source}")]
    Decode {
        id: u32,
        #[source]
        source: DecodeError,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt row for #{id}: {reason}")]
    Corrupt { id: u32, reason: String },

    #[error("no record with id {0}")]
    NotFound(u32),

    #[error("store is opened read-only")]
    ReadOnly,

    #[error("store worker is not running")]
    Closed,
}

impl StoreError {
    /// True when the store can no longer serve any request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Closed)
    }
}
