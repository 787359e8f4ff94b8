//! Transport port: the duplex channel between a session and its broker.
//!
//! Frames are structured values; byte-level encoding belongs to the adapter.

use crate::message::domain::{CodecSelection, CorrelationId, MessageGuid, ResultCode};
use crate::queue::domain::{QueueFlags, QueueKey, QueueOptions, Uri};
use crate::session::domain::{BrokerEndpoint, RequestId};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Outbound message handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutFrame {
    /// Request id echoed on the acknowledgement.
    pub request: RequestId,
    /// Queue the message is posted to.
    pub queue: QueueKey,
    /// Payload bytes after compression.
    pub payload: Vec<u8>,
    /// Effective encoding and compression.
    pub codec: CodecSelection,
    /// Correlation id of the message.
    pub correlation_id: CorrelationId,
    /// Whether the broker should acknowledge the post.
    pub ack_requested: bool,
}

/// Frame sent from a session to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Open a queue.
    OpenQueue {
        /// Request id echoed on the response.
        request: RequestId,
        /// Queue handle key.
        queue: QueueKey,
        /// Queue address.
        uri: Uri,
        /// Requested capabilities.
        flags: QueueFlags,
        /// Queue parameters.
        options: QueueOptions,
    },
    /// Change the options of an open queue.
    ConfigureQueue {
        /// Request id echoed on the response.
        request: RequestId,
        /// Queue handle key.
        queue: QueueKey,
        /// New parameters.
        options: QueueOptions,
    },
    /// Close a queue.
    CloseQueue {
        /// Request id echoed on the response.
        request: RequestId,
        /// Queue handle key.
        queue: QueueKey,
    },
    /// Post one message.
    Put(PutFrame),
    /// Confirm one delivered message.
    Confirm {
        /// Queue the message was delivered from.
        queue: QueueKey,
        /// GUID of the delivered message.
        guid: MessageGuid,
    },
    /// Announce an orderly disconnect.
    Disconnect,
}

impl OutboundFrame {
    /// Returns a short name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OpenQueue { .. } => "open_queue",
            Self::ConfigureQueue { .. } => "configure_queue",
            Self::CloseQueue { .. } => "close_queue",
            Self::Put(_) => "put",
            Self::Confirm { .. } => "confirm",
            Self::Disconnect => "disconnect",
        }
    }

    /// Returns the request id the broker will echo, if any.
    #[must_use]
    pub const fn request(&self) -> Option<RequestId> {
        match self {
            Self::OpenQueue { request, .. }
            | Self::ConfigureQueue { request, .. }
            | Self::CloseQueue { request, .. } => Some(*request),
            Self::Put(put) => Some(put.request),
            Self::Confirm { .. } | Self::Disconnect => None,
        }
    }
}

/// Broker reply to an open, configure or close request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResponse {
    /// Request id of the originating frame.
    pub request: RequestId,
    /// Outcome.
    pub status: ResultCode,
    /// Broker-supplied failure description.
    pub description: Option<String>,
}

impl OperationResponse {
    /// Creates a successful response.
    #[must_use]
    pub const fn success(request: RequestId) -> Self {
        Self {
            request,
            status: ResultCode::Success,
            description: None,
        }
    }

    /// Creates a failed response.
    #[must_use]
    pub fn failure(request: RequestId, status: ResultCode, description: impl Into<String>) -> Self {
        Self {
            request,
            status,
            description: Some(description.into()),
        }
    }
}

/// Frame received by a session from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Reply to an open request.
    OpenQueueResponse(OperationResponse),
    /// Reply to a configure request.
    ConfigureQueueResponse(OperationResponse),
    /// Reply to a close request.
    CloseQueueResponse(OperationResponse),
    /// Acknowledgement of a post.
    Ack {
        /// Request id of the acknowledged put.
        request: RequestId,
        /// GUID assigned by the broker.
        guid: MessageGuid,
        /// Outcome of the post.
        status: ResultCode,
    },
    /// Delivery of a message to a reader queue.
    Push {
        /// Queue the message is delivered to.
        queue: QueueKey,
        /// GUID assigned by the broker.
        guid: MessageGuid,
        /// Payload bytes as sent by the producer.
        payload: Vec<u8>,
        /// Encoding and compression applied by the producer.
        codec: CodecSelection,
    },
    /// The broker connection dropped.
    ConnectionLost {
        /// Description of the failure.
        reason: String,
    },
}

impl InboundFrame {
    /// Returns a short name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OpenQueueResponse(_) => "open_queue_response",
            Self::ConfigureQueueResponse(_) => "configure_queue_response",
            Self::CloseQueueResponse(_) => "close_queue_response",
            Self::Ack { .. } => "ack",
            Self::Push { .. } => "push",
            Self::ConnectionLost { .. } => "connection_lost",
        }
    }
}

/// Severity of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The failure affects one frame; the connection is intact.
    Transient,
    /// The connection is unusable.
    Fatal,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Transient => "transient",
            Self::Fatal => "fatal",
        })
    }
}

/// Failure reported by a transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} transport failure: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    /// Creates a failure that leaves the connection usable.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Creates a failure that makes the connection unusable.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Fatal,
            message: message.into(),
        }
    }

    /// Returns the severity.
    #[must_use]
    pub const fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Returns whether the connection is unusable.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind, TransportErrorKind::Fatal)
    }

    /// Returns the failure description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Duplex channel to a broker.
///
/// A session calls [`Transport::connect`] once, reads inbound frames from the
/// returned receiver on its dispatcher task, and calls [`Transport::send`]
/// from application tasks. Frames passed to `send` must reach the broker in
/// call order.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Connects to the broker and returns the inbound frame stream.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the broker cannot be reached.
    async fn connect(
        &self,
        endpoint: &BrokerEndpoint,
    ) -> TransportResult<mpsc::Receiver<InboundFrame>>;

    /// Sends one frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the frame could not be handed over.
    async fn send(&self, frame: OutboundFrame) -> TransportResult<()>;

    /// Closes the connection. Closing an unconnected transport succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the orderly shutdown fails.
    async fn disconnect(&self) -> TransportResult<()>;
}
