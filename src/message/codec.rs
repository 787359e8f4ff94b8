//! Payload checks and compression applied before posting and after delivery.
//!
//! Encoding is declarative: the payload bytes are not transformed, only
//! checked for the declared format. Compression is applied with zlib when
//! the payload is large enough to benefit, and the effective algorithm is
//! reported back so the receiver can reverse it.

use crate::message::domain::{
    CodecSelection, CompressionAlgorithmType, EncodingType, MessageDomainError,
};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};
use thiserror::Error;

/// Payloads shorter than this are posted uncompressed.
pub const COMPRESSION_THRESHOLD: usize = 1024;

/// Errors raised while encoding or decoding a payload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The encoding or compression cannot be used for posting.
    #[error(transparent)]
    Unsupported(#[from] MessageDomainError),

    /// A text-based encoding was declared for bytes that are not UTF-8.
    #[error("payload declared as {encoding} is not valid UTF-8: {reason}")]
    InvalidUtf8 {
        /// Declared encoding.
        encoding: EncodingType,
        /// Decoder message.
        reason: String,
    },

    /// A JSON encoding was declared for bytes that do not parse as JSON.
    #[error("payload declared as JSON does not parse: {0}")]
    InvalidJson(String),

    /// Compressing the payload failed.
    #[error("payload compression failed: {0}")]
    Compression(String),

    /// Decompressing the payload failed.
    #[error("payload decompression failed: {0}")]
    Decompression(String),

    /// The decoded payload is larger than the accepted limit.
    #[error("decoded payload exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Largest accepted payload, in bytes.
        limit: usize,
    },
}

/// Payload bytes as they cross the transport, with the codec that produced
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    /// Bytes handed to the transport.
    pub bytes: Vec<u8>,
    /// Encoding and the compression actually applied.
    pub codec: CodecSelection,
}

/// Validates `payload` against `requested` and compresses it when useful.
///
/// # Errors
///
/// Returns [`CodecError::Unsupported`] for unpostable selections, a format
/// error when the payload does not match its declared encoding, or
/// [`CodecError::Compression`] if zlib fails.
pub fn encode_payload(
    payload: Vec<u8>,
    requested: CodecSelection,
) -> Result<EncodedPayload, CodecError> {
    requested.validate()?;
    check_encoding(&payload, requested.encoding)?;

    match requested.compression {
        CompressionAlgorithmType::Zlib if payload.len() >= COMPRESSION_THRESHOLD => {
            Ok(EncodedPayload {
                bytes: compress(&payload)?,
                codec: requested,
            })
        }
        CompressionAlgorithmType::Zlib | CompressionAlgorithmType::None => Ok(EncodedPayload {
            bytes: payload,
            codec: CodecSelection::new(requested.encoding, CompressionAlgorithmType::None),
        }),
        CompressionAlgorithmType::Unknown => Err(CodecError::Unsupported(
            MessageDomainError::UnsupportedCompression(requested.compression),
        )),
    }
}

/// Reverses the compression recorded in `codec`, refusing payloads that
/// decode to more than `limit` bytes.
///
/// Inflation stops one byte past `limit`, so a small compressed frame cannot
/// expand without bound.
///
/// # Errors
///
/// Returns [`CodecError::Decompression`] for corrupt zlib data,
/// [`CodecError::PayloadTooLarge`] above `limit` and
/// [`CodecError::Unsupported`] for an unknown algorithm.
pub fn decode_payload(
    bytes: Vec<u8>,
    codec: CodecSelection,
    limit: usize,
) -> Result<Vec<u8>, CodecError> {
    let decoded = match codec.compression {
        CompressionAlgorithmType::None => bytes,
        CompressionAlgorithmType::Zlib => {
            let bound = u64::try_from(limit)
                .unwrap_or(u64::MAX)
                .saturating_add(1);
            let mut inflated = Vec::new();
            ZlibDecoder::new(bytes.as_slice())
                .take(bound)
                .read_to_end(&mut inflated)
                .map_err(|err| CodecError::Decompression(err.to_string()))?;
            inflated
        }
        CompressionAlgorithmType::Unknown => {
            return Err(CodecError::Unsupported(
                MessageDomainError::UnsupportedCompression(codec.compression),
            ));
        }
    };
    if decoded.len() > limit {
        return Err(CodecError::PayloadTooLarge { limit });
    }
    Ok(decoded)
}

fn check_encoding(payload: &[u8], encoding: EncodingType) -> Result<(), CodecError> {
    match encoding {
        EncodingType::Text | EncodingType::Xml => std::str::from_utf8(payload)
            .map(|_| ())
            .map_err(|err| CodecError::InvalidUtf8 {
                encoding,
                reason: err.to_string(),
            }),
        EncodingType::Json => serde_json::from_slice::<serde_json::Value>(payload)
            .map(|_| ())
            .map_err(|err| CodecError::InvalidJson(err.to_string())),
        _ => Ok(()),
    }
}

fn compress(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(payload)
        .map_err(|err| CodecError::Compression(err.to_string()))?;
    encoder
        .finish()
        .map_err(|err| CodecError::Compression(err.to_string()))
}
