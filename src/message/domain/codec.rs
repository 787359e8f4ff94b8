//! Payload encoding and compression algorithm enumerations.

use super::MessageDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declared encoding of a message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingType {
    /// No encoding was selected.
    #[default]
    Undefined,
    /// Opaque bytes.
    Raw,
    /// ASN.1 BER.
    Ber,
    /// BDEX binary serialisation.
    Bdex,
    /// XML document.
    Xml,
    /// JSON document.
    Json,
    /// UTF-8 text.
    Text,
    /// Multipart payload.
    Multiparts,
}

impl EncodingType {
    /// Every member of the enumeration.
    pub const ALL: [Self; 8] = [
        Self::Undefined,
        Self::Raw,
        Self::Ber,
        Self::Bdex,
        Self::Xml,
        Self::Json,
        Self::Text,
        Self::Multiparts,
    ];

    /// Returns the wire code of this encoding.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Undefined => 0,
            Self::Raw => 1,
            Self::Ber => 2,
            Self::Bdex => 3,
            Self::Xml => 4,
            Self::Json => 5,
            Self::Text => 6,
            Self::Multiparts => 7,
        }
    }

    /// Returns whether `code` names a member of the enumeration.
    #[must_use]
    pub const fn is_valid(code: i32) -> bool {
        matches!(code, 0..=7)
    }

    /// Returns whether a payload may be posted with this encoding.
    #[must_use]
    pub const fn is_postable(self) -> bool {
        !matches!(self, Self::Undefined)
    }

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Undefined => "UNDEFINED",
            Self::Raw => "RAW",
            Self::Ber => "BER",
            Self::Bdex => "BDEX",
            Self::Xml => "XML",
            Self::Json => "JSON",
            Self::Text => "TEXT",
            Self::Multiparts => "MULTIPARTS",
        }
    }
}

impl TryFrom<i32> for EncodingType {
    type Error = MessageDomainError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|encoding| encoding.code() == code)
            .ok_or(MessageDomainError::UnknownEncoding(code))
    }
}

impl FromStr for EncodingType {
    type Err = MessageDomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|encoding| encoding.as_str() == normalized)
            .ok_or_else(|| MessageDomainError::UnknownEncodingName(value.to_owned()))
    }
}

impl fmt::Display for EncodingType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Compression applied to a payload before it crosses the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionAlgorithmType {
    /// Placeholder for an unrecognised algorithm.
    Unknown,
    /// Payload is sent as-is.
    #[default]
    None,
    /// zlib (deflate) compression.
    Zlib,
}

impl CompressionAlgorithmType {
    /// Every member of the enumeration.
    pub const ALL: [Self; 3] = [Self::Unknown, Self::None, Self::Zlib];

    /// Returns the wire code of this algorithm.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Unknown => -1,
            Self::None => 0,
            Self::Zlib => 1,
        }
    }

    /// Returns whether `code` names a member of the enumeration.
    #[must_use]
    pub const fn is_valid(code: i32) -> bool {
        matches!(code, -1..=1)
    }

    /// Returns whether payloads may be posted with this algorithm.
    #[must_use]
    pub const fn is_postable(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::None => "NONE",
            Self::Zlib => "ZLIB",
        }
    }
}

impl TryFrom<i32> for CompressionAlgorithmType {
    type Error = MessageDomainError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.code() == code)
            .ok_or(MessageDomainError::UnknownCompression(code))
    }
}

impl FromStr for CompressionAlgorithmType {
    type Err = MessageDomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.as_str() == normalized)
            .ok_or_else(|| MessageDomainError::UnknownCompressionName(value.to_owned()))
    }
}

impl fmt::Display for CompressionAlgorithmType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// The encoding and compression pair chosen for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CodecSelection {
    /// Declared payload encoding.
    pub encoding: EncodingType,
    /// Compression algorithm.
    pub compression: CompressionAlgorithmType,
}

impl CodecSelection {
    /// Creates a selection.
    #[must_use]
    pub const fn new(encoding: EncodingType, compression: CompressionAlgorithmType) -> Self {
        Self {
            encoding,
            compression,
        }
    }

    /// Applies per-message overrides on top of `self`.
    #[must_use]
    pub fn with_overrides(
        self,
        encoding: Option<EncodingType>,
        compression: Option<CompressionAlgorithmType>,
    ) -> Self {
        Self {
            encoding: encoding.unwrap_or(self.encoding),
            compression: compression.unwrap_or(self.compression),
        }
    }

    /// Checks that both parts may be used for posting.
    ///
    /// # Errors
    ///
    /// Returns [`MessageDomainError::UnsupportedEncoding`] or
    /// [`MessageDomainError::UnsupportedCompression`].
    pub fn validate(self) -> Result<(), MessageDomainError> {
        if !self.encoding.is_postable() {
            return Err(MessageDomainError::UnsupportedEncoding(self.encoding));
        }
        if !self.compression.is_postable() {
            return Err(MessageDomainError::UnsupportedCompression(self.compression));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(-1, false)]
    #[case(0, true)]
    #[case(5, true)]
    #[case(7, true)]
    #[case(8, false)]
    fn encoding_membership(#[case] code: i32, #[case] expected: bool) {
        assert_eq!(EncodingType::is_valid(code), expected);
        assert_eq!(EncodingType::try_from(code).is_ok(), expected);
    }

    #[rstest]
    #[case(-2, false)]
    #[case(-1, true)]
    #[case(0, true)]
    #[case(1, true)]
    #[case(2, false)]
    fn compression_membership(#[case] code: i32, #[case] expected: bool) {
        assert_eq!(CompressionAlgorithmType::is_valid(code), expected);
        assert_eq!(CompressionAlgorithmType::try_from(code).is_ok(), expected);
    }

    #[test]
    fn codes_and_names_agree() {
        for encoding in EncodingType::ALL {
            assert_eq!(EncodingType::try_from(encoding.code()), Ok(encoding));
            assert_eq!(encoding.as_str().parse::<EncodingType>(), Ok(encoding));
        }
        for algorithm in CompressionAlgorithmType::ALL {
            assert_eq!(
                CompressionAlgorithmType::try_from(algorithm.code()),
                Ok(algorithm)
            );
            assert_eq!(
                algorithm.as_str().parse::<CompressionAlgorithmType>(),
                Ok(algorithm)
            );
        }
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("json".parse::<EncodingType>(), Ok(EncodingType::Json));
        assert_eq!(
            " zlib ".parse::<CompressionAlgorithmType>(),
            Ok(CompressionAlgorithmType::Zlib)
        );
        assert!("gzip".parse::<CompressionAlgorithmType>().is_err());
    }

    #[test]
    fn overrides_replace_only_supplied_parts() {
        let defaults = CodecSelection::new(EncodingType::Raw, CompressionAlgorithmType::Zlib);

        assert_eq!(defaults.with_overrides(None, None), defaults);
        assert_eq!(
            defaults.with_overrides(Some(EncodingType::Json), None),
            CodecSelection::new(EncodingType::Json, CompressionAlgorithmType::Zlib)
        );
        assert_eq!(
            defaults.with_overrides(None, Some(CompressionAlgorithmType::None)),
            CodecSelection::new(EncodingType::Raw, CompressionAlgorithmType::None)
        );
    }

    #[test]
    fn unsupported_members_fail_validation() {
        assert_eq!(
            CodecSelection::new(EncodingType::Undefined, CompressionAlgorithmType::None)
                .validate(),
            Err(MessageDomainError::UnsupportedEncoding(
                EncodingType::Undefined
            ))
        );
        assert_eq!(
            CodecSelection::new(EncodingType::Raw, CompressionAlgorithmType::Unknown).validate(),
            Err(MessageDomainError::UnsupportedCompression(
                CompressionAlgorithmType::Unknown
            ))
        );
    }
}
