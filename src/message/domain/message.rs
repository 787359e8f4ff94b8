//! Messages carried inside message events, and the caller-side input for
//! posting.

use super::{
    CodecSelection, CompressionAlgorithmType, CorrelationId, EncodingType, MessageEventType,
    MessageGuid, ResultCode,
};
use crate::queue::domain::QueueId;

/// Largest payload accepted for posting, in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// A message inside a [`super::MessageEvent`].
///
/// Messages are handed out by reference while iterating their event. Use
/// `clone()` to keep one beyond the event's lifetime.
///
/// # Invariants
///
/// - `Put` messages carry the effective codec, which may differ from the
///   requested one when compression did not pay off
/// - `Push` messages carry decoded payloads and a broker-assigned GUID
/// - `Ack` messages carry the correlation id of the post they acknowledge
///   and an acknowledgement status
#[derive(Debug, Clone, Default)]
pub struct Message {
    kind: Option<MessageEventType>,
    queue: Option<QueueId>,
    payload: Vec<u8>,
    guid: MessageGuid,
    correlation_id: CorrelationId,
    codec: CodecSelection,
    ack_status: Option<ResultCode>,
}

impl Message {
    pub(crate) fn put(
        queue: QueueId,
        payload: Vec<u8>,
        correlation_id: CorrelationId,
        codec: CodecSelection,
    ) -> Self {
        Self {
            kind: Some(MessageEventType::Put),
            queue: Some(queue),
            payload,
            guid: MessageGuid::UNSET,
            correlation_id,
            codec,
            ack_status: None,
        }
    }

    pub(crate) fn push(
        queue: QueueId,
        payload: Vec<u8>,
        guid: MessageGuid,
        codec: CodecSelection,
    ) -> Self {
        let correlation_id = queue.correlation_id().clone();
        Self {
            kind: Some(MessageEventType::Push),
            queue: Some(queue),
            payload,
            guid,
            correlation_id,
            codec,
            ack_status: None,
        }
    }

    pub(crate) fn ack(
        queue: QueueId,
        guid: MessageGuid,
        correlation_id: CorrelationId,
        status: ResultCode,
    ) -> Self {
        Self {
            kind: Some(MessageEventType::Ack),
            queue: Some(queue),
            payload: Vec::new(),
            guid,
            correlation_id,
            codec: CodecSelection::default(),
            ack_status: Some(status),
        }
    }

    /// Returns the kind of event this message belongs to.
    ///
    /// `None` only for the default placeholder.
    #[must_use]
    pub const fn kind(&self) -> Option<MessageEventType> {
        self.kind
    }

    /// Returns the queue the message was posted to or delivered from.
    #[must_use]
    pub const fn queue(&self) -> Option<&QueueId> {
        self.queue.as_ref()
    }

    /// Returns the payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the payload length in bytes.
    #[must_use]
    pub fn data_size(&self) -> usize {
        self.payload.len()
    }

    /// Returns the broker-assigned GUID, unset for outbound messages.
    #[must_use]
    pub const fn guid(&self) -> MessageGuid {
        self.guid
    }

    /// Returns the correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Returns the payload encoding.
    #[must_use]
    pub const fn encoding(&self) -> EncodingType {
        self.codec.encoding
    }

    /// Returns the compression algorithm applied to the payload.
    #[must_use]
    pub const fn compression(&self) -> CompressionAlgorithmType {
        self.codec.compression
    }

    /// Returns the encoding and compression pair.
    #[must_use]
    pub const fn codec(&self) -> CodecSelection {
        self.codec
    }

    /// Returns the acknowledgement status of an `Ack` message.
    #[must_use]
    pub const fn ack_status(&self) -> Option<ResultCode> {
        self.ack_status
    }

    /// Returns whether this is a well-formed message rather than a
    /// placeholder.
    ///
    /// The size check uses the protocol ceiling [`MAX_PAYLOAD_SIZE`]. A
    /// message carries no session, so the tighter per-session
    /// `max_payload_size` is enforced where messages enter one: by the
    /// builder when packing and by the session when decoding deliveries.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let Some(kind) = self.kind else {
            return false;
        };
        if self.queue.is_none() || self.payload.len() > MAX_PAYLOAD_SIZE {
            return false;
        }
        match kind {
            MessageEventType::Put => !self.payload.is_empty(),
            MessageEventType::Push => !self.guid.is_unset(),
            MessageEventType::Ack => self.ack_status.is_some(),
        }
    }
}

/// Caller-side description of a message to post.
///
/// Encoding and compression left unset fall back to the queue's defaults.
#[derive(Debug, Clone, Default)]
pub struct PutMessage {
    payload: Vec<u8>,
    correlation_id: CorrelationId,
    encoding: Option<EncodingType>,
    compression: Option<CompressionAlgorithmType>,
}

impl PutMessage {
    /// Creates a message with the given payload.
    #[must_use]
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Sets the correlation id echoed on the acknowledgement.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Overrides the queue's default encoding.
    #[must_use]
    pub const fn with_encoding(mut self, encoding: EncodingType) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Overrides the queue's default compression.
    #[must_use]
    pub const fn with_compression(mut self, compression: CompressionAlgorithmType) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Returns the payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Returns the encoding override.
    #[must_use]
    pub const fn encoding(&self) -> Option<EncodingType> {
        self.encoding
    }

    /// Returns the compression override.
    #[must_use]
    pub const fn compression(&self) -> Option<CompressionAlgorithmType> {
        self.compression
    }

    pub(crate) fn into_parts(self) -> (Vec<u8>, CorrelationId) {
        (self.payload, self.correlation_id)
    }
}
