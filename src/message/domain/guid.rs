//! Broker-assigned message identifiers.

use super::MessageDomainError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Globally unique identifier of a posted message.
///
/// The binary form is always 16 bytes. The textual form is 32 uppercase
/// hexadecimal characters. The all-zero value is the unset sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MessageGuid([u8; MessageGuid::SIZE]);

impl MessageGuid {
    /// Width of the binary representation in bytes.
    pub const SIZE: usize = 16;

    /// Width of the hexadecimal representation in characters.
    pub const SIZE_HEX: usize = 32;

    /// The unset sentinel.
    pub const UNSET: Self = Self([0; Self::SIZE]);

    /// Creates a GUID from its binary representation.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a fresh random GUID.
    ///
    /// Brokers assign GUIDs; this constructor exists for adapters that play
    /// the broker role.
    #[must_use]
    pub fn new_random() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Parses a GUID from its hexadecimal representation.
    ///
    /// Both upper- and lower-case digits are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`MessageDomainError::MalformedGuid`] when the input is not
    /// exactly 32 hexadecimal characters.
    pub fn from_hex(value: &str) -> Result<Self, MessageDomainError> {
        if value.len() != Self::SIZE_HEX {
            return Err(MessageDomainError::MalformedGuid {
                value: value.to_owned(),
                reason: format!(
                    "expected {} hex characters, got {}",
                    Self::SIZE_HEX,
                    value.len()
                ),
            });
        }

        let mut bytes = [0_u8; Self::SIZE];
        hex::decode_to_slice(value, &mut bytes).map_err(|err| {
            MessageDomainError::MalformedGuid {
                value: value.to_owned(),
                reason: err.to_string(),
            }
        })?;
        Ok(Self(bytes))
    }

    /// Returns whether `value` is a well-formed hexadecimal GUID.
    #[must_use]
    pub fn is_valid_hex_representation(value: &str) -> bool {
        value.len() == Self::SIZE_HEX && value.bytes().all(|byte| byte.is_ascii_hexdigit())
    }

    /// Returns the uppercase hexadecimal representation.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    /// Returns the binary representation.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.0
    }

    /// Returns whether this is the unset sentinel.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }
}

impl fmt::Display for MessageGuid {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.to_hex())
    }
}

impl FromStr for MessageGuid {
    type Err = MessageDomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_hex(value)
    }
}

impl Serialize for MessageGuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MessageGuid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_hex(&value).map_err(serde::de::Error::custom)
    }
}
