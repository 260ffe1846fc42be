//! Error types for the payload store.

/// Errors from payload store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("payload I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A `.b64` file that is not valid base64.
    #[error("invalid base64 payload in {name}: {source}")]
    Base64 {
        /// The offending file name.
        name: String,
        /// The decode failure.
        #[source]
        source: base64::DecodeError,
    },

    /// A `.gz` file that is not a valid gzip stream.
    #[error("invalid gzip payload in {name}: {source}")]
    Gzip {
        /// The offending file name.
        name: String,
        /// The decompression failure.
        #[source]
        source: std::io::Error,
    },

    /// A download path that tries to escape its stream directory.
    #[error("invalid file path: {0}")]
    InvalidPath(String),

    /// A stream directory that does not exist on disk.
    #[error("no payload directory for stream {0}")]
    NoSuchStream(String),
}
