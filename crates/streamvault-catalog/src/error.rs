//! Error types for catalog operations.

/// Errors from catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Filesystem failure.
    #[error("catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failure.
    #[error("catalog serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// An update against a stream the catalog does not know.
    #[error("catalog has no record for stream {0}")]
    UnknownStream(String),

    /// An options lookup against a target the catalog does not know.
    #[error("catalog has no record for target {0}")]
    UnknownTarget(String),
}
