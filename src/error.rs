use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Error type for NeoSearch operations, one variant per error kind the
/// core distinguishes (index/database naming, codec contracts, backend
/// I/O, protocol and metadata problems, and internal invariant failures).
#[derive(Error, Debug)]
pub enum NeoSearchError {
    /// Index or database name fails its naming regex.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// A queried key was absent. Distinct from "present with empty value".
    #[error("not found")]
    NotFound,

    /// Create-index on an index that already exists.
    #[error("index already exists: {0}")]
    AlreadyExists(String),

    /// Bytes decoded under a typed key/value contract violated it, e.g. a
    /// posting-list whose length isn't a multiple of 8.
    #[error("codec error: {0}")]
    Codec(String),

    /// Underlying KV backend reported a failure.
    #[error("backend I/O error: {0}")]
    BackendIo(String),

    /// Metadata declared a type the indexing pipeline does not implement.
    #[error("unsupported type: {0}")]
    Unsupported(String),

    /// Command textual form malformed, or search DSL missing a required
    /// clause.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Internal invariant violated (eviction of non-store value, queue
    /// underflow, etc). Callers may close and recreate the engine.
    #[error("fatal: {0}")]
    Fatal(String),

    /// IO error from file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// sled backend error.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// UTF-8 conversion error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// Result type alias for NeoSearch operations.
pub type Result<T> = std::result::Result<T, NeoSearchError>;
