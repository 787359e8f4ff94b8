//! Error types for message domain values.

use super::{CompressionAlgorithmType, EncodingType};
use thiserror::Error;

/// Errors returned while constructing or validating message domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessageDomainError {
    /// A GUID string is not 32 hexadecimal characters.
    #[error("malformed message GUID '{value}': {reason}")]
    MalformedGuid {
        /// Rejected input.
        value: String,
        /// Description of the syntax violation.
        reason: String,
    },

    /// A numeric encoding code is outside the enumeration.
    #[error("unknown encoding type code {0}")]
    UnknownEncoding(i32),

    /// An encoding name is not recognised.
    #[error("unknown encoding type '{0}'")]
    UnknownEncodingName(String),

    /// A numeric compression code is outside the enumeration.
    #[error("unknown compression algorithm code {0}")]
    UnknownCompression(i32),

    /// A compression name is not recognised.
    #[error("unknown compression algorithm '{0}'")]
    UnknownCompressionName(String),

    /// The encoding cannot be used for posting.
    #[error("encoding {0} is not supported for posting")]
    UnsupportedEncoding(EncodingType),

    /// The compression algorithm cannot be used for posting.
    #[error("compression algorithm {0} is not supported for posting")]
    UnsupportedCompression(CompressionAlgorithmType),
}

impl MessageDomainError {
    /// Returns whether the input was syntactically malformed, as opposed to
    /// well-formed but semantically invalid.
    #[must_use]
    pub const fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedGuid { .. } | Self::UnknownEncodingName(_) | Self::UnknownCompressionName(_)
        )
    }
}
