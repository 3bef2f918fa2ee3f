use thiserror::Error;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised while packing or unpacking vector payloads
#[derive(Error, Debug)]
pub enum CodecError {
    /// Tag carries an encoding nibble this build does not know
    #[error("Unknown encoding in codec tag {tag:#010b}")]
    UnknownEncoding { tag: u8 },

    /// Tag carries a compression nibble this build does not know
    #[error("Unknown compression in codec tag {tag:#010b}")]
    UnknownCompression { tag: u8 },

    /// Compressed payload is corrupt or truncated
    #[error("Failed to decompress {compression} payload: {source}")]
    Decompress {
        compression: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Compression stream could not be written
    #[error("Failed to compress {compression} payload: {source}")]
    Compress {
        compression: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Payload decompressed fine but is not a numeric array
    #[error("Malformed encoded values: {0}")]
    Malformed(#[from] serde_json::Error),

    /// NaN and infinities have no representation in the text encoding
    #[error("Value at index {index} is not finite ({value})")]
    NonFinite { index: usize, value: f64 },

    #[error("Unknown compression name: {0}")]
    UnknownCompressionName(String),
}

impl CodecError {
    /// True for failures that happen when reading a stored payload back.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Self::UnknownEncoding { .. }
                | Self::UnknownCompression { .. }
                | Self::Decompress { .. }
                | Self::Malformed(_)
        )
    }
}
