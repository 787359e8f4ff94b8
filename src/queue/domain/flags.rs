//! Queue capability flags.

use super::QueueDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// Bitset of capabilities requested when opening a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueFlags(u64);

impl QueueFlags {
    /// Administrative access.
    pub const ADMIN: Self = Self(1 << 0);
    /// Consume messages.
    pub const READ: Self = Self(1 << 1);
    /// Post messages.
    pub const WRITE: Self = Self(1 << 2);
    /// Request acknowledgement of posted messages.
    pub const ACK: Self = Self(1 << 3);

    const KNOWN: [(Self, &'static str); 4] = [
        (Self::ADMIN, "ADMIN"),
        (Self::READ, "READ"),
        (Self::WRITE, "WRITE"),
        (Self::ACK, "ACK"),
    ];

    const ALL_BITS: u64 = Self::ADMIN.0 | Self::READ.0 | Self::WRITE.0 | Self::ACK.0;

    /// Returns the empty bitset.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Creates a bitset from raw bits without validation.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns whether no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns whether every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns whether administrative access is requested.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        self.contains(Self::ADMIN)
    }

    /// Returns whether consuming is requested.
    #[must_use]
    pub const fn is_reader(self) -> bool {
        self.contains(Self::READ)
    }

    /// Returns whether posting is requested.
    #[must_use]
    pub const fn is_writer(self) -> bool {
        self.contains(Self::WRITE)
    }

    /// Returns whether acknowledgements are requested.
    #[must_use]
    pub const fn is_ack(self) -> bool {
        self.contains(Self::ACK)
    }

    /// Checks the bitset for contradictory or unknown combinations.
    ///
    /// # Errors
    ///
    /// Returns [`QueueDomainError::UnknownFlagBits`] for bits outside the
    /// known set, [`QueueDomainError::MissingReadOrWrite`] when neither
    /// `READ` nor `WRITE` is set, and [`QueueDomainError::AckWithoutWrite`]
    /// when `ACK` is set without `WRITE`.
    pub fn validate(self) -> Result<(), QueueDomainError> {
        let unknown = self.0 & !Self::ALL_BITS;
        if unknown != 0 {
            return Err(QueueDomainError::UnknownFlagBits(unknown));
        }
        if !self.is_reader() && !self.is_writer() {
            return Err(QueueDomainError::MissingReadOrWrite);
        }
        if self.is_ack() && !self.is_writer() {
            return Err(QueueDomainError::AckWithoutWrite);
        }
        Ok(())
    }

    /// Returns whether [`validate`](Self::validate) accepts the bitset.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.validate().is_ok()
    }
}

impl BitOr for QueueFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for QueueFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for QueueFlags {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = Self::KNOWN
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>();
        formatter.write_str(&names.join(","))
    }
}

impl FromStr for QueueFlags {
    type Err = QueueDomainError;

    /// Parses a comma-separated list such as `READ,WRITE`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .try_fold(Self::empty(), |acc, part| {
                let upper = part.to_ascii_uppercase();
                Self::KNOWN
                    .iter()
                    .find(|(_, name)| *name == upper)
                    .map(|(flag, _)| acc | *flag)
                    .ok_or_else(|| QueueDomainError::UnknownFlagName(part.to_owned()))
            })
    }
}
