//! Queue operation requests and the identifiers that correlate their
//! responses.

use crate::message::domain::CorrelationId;
use crate::queue::domain::{QueueFlags, QueueId, QueueOptions, Uri};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session-assigned identifier of one outstanding request.
///
/// Request ids are carried by outbound frames and echoed by the broker so
/// the session can find the pending operation a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Wraps a raw request id.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "#{}", self.0)
    }
}

/// Kind of operation awaiting a broker response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Queue open.
    Open,
    /// Queue reconfiguration.
    Configure,
    /// Queue close.
    Close,
    /// Post awaiting acknowledgement.
    Post,
}

impl OperationKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Configure => "configure",
            Self::Close => "close",
            Self::Post => "post",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Request to open a queue.
#[derive(Debug, Clone)]
pub struct OpenQueueRequest {
    queue: QueueId,
    uri: Uri,
    flags: QueueFlags,
    options: Option<QueueOptions>,
    correlation_id: Option<CorrelationId>,
}

impl OpenQueueRequest {
    /// Creates a request using the session's default options and the
    /// queue's own correlation id.
    #[must_use]
    pub fn new(queue: &QueueId, uri: Uri, flags: QueueFlags) -> Self {
        Self {
            queue: queue.clone(),
            uri,
            flags,
            options: None,
            correlation_id: None,
        }
    }

    /// Supplies queue options instead of the session defaults.
    #[must_use]
    pub fn with_options(mut self, options: QueueOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Supplies the correlation id reported on the result.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Returns the queue handle.
    #[must_use]
    pub const fn queue(&self) -> &QueueId {
        &self.queue
    }

    /// Returns the queue address.
    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the requested flags.
    #[must_use]
    pub const fn flags(&self) -> QueueFlags {
        self.flags
    }

    /// Returns the explicit options, if any.
    #[must_use]
    pub const fn options(&self) -> Option<&QueueOptions> {
        self.options.as_ref()
    }

    /// Returns the explicit correlation id, if any.
    #[must_use]
    pub const fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }
}

/// Request to change the options of an open queue.
#[derive(Debug, Clone)]
pub struct ConfigureQueueRequest {
    queue: QueueId,
    options: QueueOptions,
    correlation_id: Option<CorrelationId>,
}

impl ConfigureQueueRequest {
    /// Creates a request reporting the queue's own correlation id.
    #[must_use]
    pub fn new(queue: &QueueId, options: QueueOptions) -> Self {
        Self {
            queue: queue.clone(),
            options,
            correlation_id: None,
        }
    }

    /// Supplies the correlation id reported on the result.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Returns the queue handle.
    #[must_use]
    pub const fn queue(&self) -> &QueueId {
        &self.queue
    }

    /// Returns the new options.
    #[must_use]
    pub const fn options(&self) -> &QueueOptions {
        &self.options
    }

    /// Returns the explicit correlation id, if any.
    #[must_use]
    pub const fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }
}

/// Request to close a queue.
#[derive(Debug, Clone)]
pub struct CloseQueueRequest {
    queue: QueueId,
    correlation_id: Option<CorrelationId>,
}

impl CloseQueueRequest {
    /// Creates a request reporting the queue's own correlation id.
    #[must_use]
    pub fn new(queue: &QueueId) -> Self {
        Self {
            queue: queue.clone(),
            correlation_id: None,
        }
    }

    /// Supplies the correlation id reported on the result.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Returns the queue handle.
    #[must_use]
    pub const fn queue(&self) -> &QueueId {
        &self.queue
    }

    /// Returns the explicit correlation id, if any.
    #[must_use]
    pub const fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }
}
