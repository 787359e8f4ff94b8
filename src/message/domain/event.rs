//! Events delivered by a session.
//!
//! [`Event`] is a closed sum type: session lifecycle notices on one side and
//! batches of messages on the other.

use super::{CorrelationId, Message, ResultCode};
use crate::queue::domain::QueueId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::FusedIterator;
use std::slice;
use std::sync::Arc;

/// Kind of session-level notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventType {
    /// The session connected to the broker.
    Connected,
    /// The session disconnected after a stop.
    Disconnected,
    /// The connection dropped unexpectedly.
    ConnectionLost,
    /// Result of an open request.
    QueueOpenResult,
    /// Result of a configure request.
    QueueConfigureResult,
    /// Result of a close request.
    QueueCloseResult,
    /// A failure not tied to a queue operation.
    Error,
    /// An operation without a more specific result type timed out.
    Timeout,
    /// The pull queue exceeded its high watermark.
    SlowConsumerHighWatermark,
    /// The pull queue drained back to its low watermark.
    SlowConsumerNormal,
}

impl SessionEventType {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
            Self::ConnectionLost => "CONNECTION_LOST",
            Self::QueueOpenResult => "QUEUE_OPEN_RESULT",
            Self::QueueConfigureResult => "QUEUE_CONFIGURE_RESULT",
            Self::QueueCloseResult => "QUEUE_CLOSE_RESULT",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
            Self::SlowConsumerHighWatermark => "SLOWCONSUMER_HIGHWATERMARK",
            Self::SlowConsumerNormal => "SLOWCONSUMER_NORMAL",
        }
    }

    /// Returns whether this type reports a queue operation.
    #[must_use]
    pub const fn is_queue_result(self) -> bool {
        matches!(
            self,
            Self::QueueOpenResult | Self::QueueConfigureResult | Self::QueueCloseResult
        )
    }
}

impl fmt::Display for SessionEventType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Session-level notice with its result and originating correlation id.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    event_type: SessionEventType,
    status: ResultCode,
    correlation_id: CorrelationId,
    queue: Option<QueueId>,
    error_description: Option<String>,
    timestamp: DateTime<Utc>,
}

impl SessionEvent {
    /// Creates a session event.
    #[must_use]
    pub const fn new(
        event_type: SessionEventType,
        status: ResultCode,
        correlation_id: CorrelationId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            status,
            correlation_id,
            queue: None,
            error_description: None,
            timestamp,
        }
    }

    /// Attaches the queue the event reports on.
    #[must_use]
    pub fn with_queue(mut self, queue: QueueId) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Attaches a human-readable failure description.
    #[must_use]
    pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
        self.error_description = Some(description.into());
        self
    }

    /// Returns the event type.
    #[must_use]
    pub const fn event_type(&self) -> SessionEventType {
        self.event_type
    }

    /// Returns the result code.
    #[must_use]
    pub const fn status(&self) -> ResultCode {
        self.status
    }

    /// Returns the correlation id of the originating request.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Returns the queue for queue results.
    #[must_use]
    pub const fn queue(&self) -> Option<&QueueId> {
        self.queue.as_ref()
    }

    /// Returns the failure description, if any.
    #[must_use]
    pub fn error_description(&self) -> Option<&str> {
        self.error_description.as_deref()
    }

    /// Returns when the session produced the event.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} status={} correlationId={}",
            self.event_type, self.status, self.correlation_id
        )?;
        if let Some(description) = &self.error_description {
            write!(formatter, " error=\"{description}\"")?;
        }
        Ok(())
    }
}

/// Kind of message batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageEventType {
    /// Outbound messages assembled for posting.
    Put,
    /// Messages delivered to a reader queue.
    Push,
    /// Acknowledgements of earlier posts.
    Ack,
}

impl MessageEventType {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Put => "PUT",
            Self::Push => "PUSH",
            Self::Ack => "ACK",
        }
    }
}

impl fmt::Display for MessageEventType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct MessageBatch {
    event_type: MessageEventType,
    messages: Vec<Message>,
}

/// Immutable, ordered batch of messages.
///
/// Cloning is cheap and shares the batch.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    batch: Arc<MessageBatch>,
}

impl MessageEvent {
    pub(crate) fn new(event_type: MessageEventType, messages: Vec<Message>) -> Self {
        Self {
            batch: Arc::new(MessageBatch {
                event_type,
                messages,
            }),
        }
    }

    /// Returns the batch kind.
    #[must_use]
    pub fn event_type(&self) -> MessageEventType {
        self.batch.event_type
    }

    /// Returns a fresh single-pass iterator over the messages in order.
    #[must_use]
    pub fn messages(&self) -> MessageIter<'_> {
        MessageIter {
            inner: self.batch.messages.iter(),
        }
    }

    /// Returns the number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.batch.messages.len()
    }

    /// Returns whether the batch holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.messages.is_empty()
    }
}

impl fmt::Display for MessageEvent {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} messages={}", self.event_type(), self.len())
    }
}

/// Forward-only iterator over the messages of a [`MessageEvent`].
#[derive(Debug)]
pub struct MessageIter<'a> {
    inner: slice::Iter<'a, Message>,
}

impl<'a> Iterator for MessageIter<'a> {
    type Item = &'a Message;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for MessageIter<'_> {}

impl FusedIterator for MessageIter<'_> {}

/// Anything a session delivers to the application.
#[derive(Debug, Clone)]
pub enum Event {
    /// A session or queue lifecycle notice.
    Session(SessionEvent),
    /// A batch of messages.
    Message(MessageEvent),
}

impl Event {
    /// Returns whether this is a session event.
    #[must_use]
    pub const fn is_session_event(&self) -> bool {
        matches!(self, Self::Session(_))
    }

    /// Returns whether this is a message event.
    #[must_use]
    pub const fn is_message_event(&self) -> bool {
        matches!(self, Self::Message(_))
    }

    /// Returns the session event, if this is one.
    #[must_use]
    pub const fn as_session_event(&self) -> Option<&SessionEvent> {
        match self {
            Self::Session(event) => Some(event),
            Self::Message(_) => None,
        }
    }

    /// Returns the message event, if this is one.
    #[must_use]
    pub const fn as_message_event(&self) -> Option<&MessageEvent> {
        match self {
            Self::Message(event) => Some(event),
            Self::Session(_) => None,
        }
    }
}

impl From<SessionEvent> for Event {
    fn from(event: SessionEvent) -> Self {
        Self::Session(event)
    }
}

impl From<MessageEvent> for Event {
    fn from(event: MessageEvent) -> Self {
        Self::Message(event)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(event) => write!(formatter, "SessionEvent[{event}]"),
            Self::Message(event) => write!(formatter, "MessageEvent[{event}]"),
        }
    }
}
