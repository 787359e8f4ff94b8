//! Result codes carried by session and acknowledgement events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of an asynchronous operation as reported on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    /// The operation succeeded.
    Success,
    /// The operation failed for an unspecified reason.
    Unknown,
    /// The operation did not complete in time.
    Timeout,
    /// No connection to the broker was available.
    NotConnected,
    /// The operation was abandoned because the session stopped.
    Cancelled,
    /// The broker does not support the operation.
    NotSupported,
    /// The broker refused the operation.
    Refused,
    /// An argument was rejected.
    InvalidArgument,
    /// The broker is not ready to serve the request.
    NotReady,
    /// Another transition is already pending on the queue.
    AlreadyInProgress,
    /// The queue is already open.
    AlreadyOpened,
    /// The queue URI is invalid.
    InvalidUri,
    /// The queue flags are invalid.
    InvalidFlags,
    /// The correlation id is already used by another open queue.
    CorrelationIdNotUnique,
    /// The queue's unacknowledged message limit was reached.
    LimitMessages,
    /// The queue's unacknowledged byte limit was reached.
    LimitBytes,
    /// The broker failed to persist the message.
    StorageFailure,
}

impl ResultCode {
    /// Returns whether this code reports success.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Unknown => "UNKNOWN",
            Self::Timeout => "TIMEOUT",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Cancelled => "CANCELED",
            Self::NotSupported => "NOT_SUPPORTED",
            Self::Refused => "REFUSED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotReady => "NOT_READY",
            Self::AlreadyInProgress => "ALREADY_IN_PROGRESS",
            Self::AlreadyOpened => "ALREADY_OPENED",
            Self::InvalidUri => "INVALID_URI",
            Self::InvalidFlags => "INVALID_FLAGS",
            Self::CorrelationIdNotUnique => "CORRELATIONID_NOT_UNIQUE",
            Self::LimitMessages => "LIMIT_MESSAGES",
            Self::LimitBytes => "LIMIT_BYTES",
            Self::StorageFailure => "STORAGE_FAILURE",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
