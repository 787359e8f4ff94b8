//! Write-only accumulators for outbound batches.
//!
//! Each append is validated eagerly; a rejected append leaves the batch as it
//! was. Finalising an empty builder fails.

use super::codec::{CodecError, encode_payload};
use super::domain::{
    CorrelationId, MAX_PAYLOAD_SIZE, Message, MessageEvent, MessageEventType, MessageGuid,
    PutMessage,
};
use crate::queue::domain::{QueueBinding, QueueId, QueueState};
use thiserror::Error;

/// Errors returned when an append or finalisation is rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuilderError {
    /// The payload is empty.
    #[error("message payload must not be empty")]
    EmptyPayload,

    /// The payload exceeds the configured limit.
    #[error("message payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge {
        /// Payload length in bytes.
        size: usize,
        /// Configured limit in bytes.
        limit: usize,
    },

    /// The queue is not open for messages.
    #[error("queue is not open (state: {state})")]
    QueueNotOpened {
        /// State the queue is in.
        state: QueueState,
    },

    /// The queue was not opened with WRITE.
    #[error("queue was not opened for writing")]
    QueueReadOnly,

    /// The queue was not opened with READ.
    #[error("queue was not opened for reading")]
    QueueNotReader,

    /// The correlation id refers to an object that no longer exists.
    #[error("correlation id refers to a dropped object")]
    DanglingCorrelationId,

    /// The payload failed encoding or compression.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Only delivered messages can be confirmed.
    #[error("only delivered messages can be confirmed")]
    NotDelivered,

    /// The message has no broker-assigned GUID.
    #[error("message GUID is unset")]
    UnsetGuid,

    /// Nothing was appended before finalising.
    #[error("builder holds no messages")]
    EmptyBatch,
}

/// Accumulates messages into one `Put` [`MessageEvent`].
///
/// # Examples
///
/// ```
/// use mqsession::message::builder::{BuilderError, MessageEventBuilder};
///
/// let builder = MessageEventBuilder::new();
/// assert_eq!(builder.build().err(), Some(BuilderError::EmptyBatch));
/// ```
#[derive(Debug)]
pub struct MessageEventBuilder {
    messages: Vec<Message>,
    max_payload_size: usize,
}

impl Default for MessageEventBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageEventBuilder {
    /// Creates an empty builder with the default payload limit.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_max_payload_size(MAX_PAYLOAD_SIZE)
    }

    /// Creates an empty builder with a custom payload limit.
    #[must_use]
    pub const fn with_max_payload_size(max_payload_size: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_payload_size,
        }
    }

    /// Validates and appends one message for `queue`.
    ///
    /// The codec is the queue's default with the message's overrides applied.
    /// An unset correlation id is replaced by an auto value, which is
    /// returned so the caller can match the acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns a [`BuilderError`] describing the first failed check. The
    /// batch is unchanged on error.
    pub fn pack_message(
        &mut self,
        queue: &QueueId,
        message: PutMessage,
    ) -> Result<CorrelationId, BuilderError> {
        let size = message.payload().len();
        if size == 0 {
            return Err(BuilderError::EmptyPayload);
        }
        if size > self.max_payload_size {
            return Err(BuilderError::PayloadTooLarge {
                size,
                limit: self.max_payload_size,
            });
        }

        let binding = open_binding(queue)?;
        if !binding.flags().is_writer() {
            return Err(BuilderError::QueueReadOnly);
        }
        if message.correlation_id().is_dangling() {
            return Err(BuilderError::DanglingCorrelationId);
        }

        let requested = binding
            .options()
            .codec()
            .with_overrides(message.encoding(), message.compression());
        let (payload, requested_correlation) = message.into_parts();
        let encoded = encode_payload(payload, requested)?;
        let correlation_id = requested_correlation.or_auto();

        self.messages.push(Message::put(
            queue.clone(),
            encoded.bytes,
            correlation_id.clone(),
            encoded.codec,
        ));
        Ok(correlation_id)
    }

    /// Returns the number of packed messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Discards every packed message.
    pub fn reset(&mut self) {
        self.messages.clear();
    }

    /// Finalises the batch.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::EmptyBatch`] when nothing was packed.
    pub fn build(self) -> Result<MessageEvent, BuilderError> {
        if self.messages.is_empty() {
            return Err(BuilderError::EmptyBatch);
        }
        Ok(MessageEvent::new(MessageEventType::Put, self.messages))
    }
}

fn open_binding(queue: &QueueId) -> Result<QueueBinding, BuilderError> {
    match queue.snapshot() {
        (state, Some(binding)) if state.accepts_messages() => Ok(binding),
        (state, _) => Err(BuilderError::QueueNotOpened { state }),
    }
}

/// One consumer confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    queue: QueueId,
    guid: MessageGuid,
}

impl Confirmation {
    /// Returns the queue the message was delivered from.
    #[must_use]
    pub const fn queue(&self) -> &QueueId {
        &self.queue
    }

    /// Returns the GUID of the confirmed message.
    #[must_use]
    pub const fn guid(&self) -> MessageGuid {
        self.guid
    }
}

/// Immutable set of confirmations ready to hand to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmBatch {
    confirmations: Vec<Confirmation>,
}

impl ConfirmBatch {
    /// Returns the confirmations in append order.
    #[must_use]
    pub fn confirmations(&self) -> &[Confirmation] {
        &self.confirmations
    }

    /// Returns the number of confirmations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.confirmations.len()
    }

    /// Returns whether the batch is empty. Always false for built batches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.confirmations.is_empty()
    }
}

/// Accumulates confirmations for delivered messages.
#[derive(Debug, Default)]
pub struct ConfirmEventBuilder {
    confirmations: Vec<Confirmation>,
}

impl ConfirmEventBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a confirmation for a delivered message.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::NotDelivered`] for anything but a `Push`
    /// message, otherwise the errors of [`Self::add_confirmation`].
    pub fn add_message_confirmation(&mut self, message: &Message) -> Result<(), BuilderError> {
        if message.kind() != Some(MessageEventType::Push) {
            return Err(BuilderError::NotDelivered);
        }
        let queue = message.queue().ok_or(BuilderError::NotDelivered)?;
        self.add_confirmation(queue, message.guid())
    }

    /// Appends a confirmation by queue and GUID.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::UnsetGuid`], [`BuilderError::QueueNotOpened`]
    /// or [`BuilderError::QueueNotReader`].
    pub fn add_confirmation(
        &mut self,
        queue: &QueueId,
        guid: MessageGuid,
    ) -> Result<(), BuilderError> {
        if guid.is_unset() {
            return Err(BuilderError::UnsetGuid);
        }
        let binding = open_binding(queue)?;
        if !binding.flags().is_reader() {
            return Err(BuilderError::QueueNotReader);
        }
        self.confirmations.push(Confirmation {
            queue: queue.clone(),
            guid,
        });
        Ok(())
    }

    /// Returns the number of confirmations appended so far.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.confirmations.len()
    }

    /// Discards every appended confirmation.
    pub fn reset(&mut self) {
        self.confirmations.clear();
    }

    /// Finalises the batch.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::EmptyBatch`] when nothing was appended.
    pub fn build(self) -> Result<ConfirmBatch, BuilderError> {
        if self.confirmations.is_empty() {
            return Err(BuilderError::EmptyBatch);
        }
        Ok(ConfirmBatch {
            confirmations: self.confirmations,
        })
    }
}
