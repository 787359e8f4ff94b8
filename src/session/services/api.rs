//! Application-facing session contract shared by the live and mock sessions.

use super::SessionResult;
use crate::message::builder::{ConfirmBatch, ConfirmEventBuilder, MessageEventBuilder};
use crate::message::domain::{CorrelationId, Event, Message, MessageEvent, PutMessage, SessionEvent};
use crate::queue::domain::QueueId;
use crate::session::domain::{
    CloseQueueRequest, ConfigureQueueRequest, OpenQueueRequest, SessionState,
};
use async_trait::async_trait;
use std::time::Duration;

/// Operations an application performs against a broker session.
///
/// Synchronous variants (`*_sync`) wait for the broker's result and return
/// it as a [`SessionEvent`]; a failed status is not an error. Asynchronous
/// variants return once the request is sent, and the result arrives later
/// as an event carrying the returned correlation id.
///
/// # Errors
///
/// Every operation fails with a [`super::SessionError`] when the session
/// state, queue state or arguments make the request impossible. Such
/// failures never produce an event.
#[async_trait]
pub trait QueueSession: Send + Sync {
    /// Returns the current lifecycle state.
    fn state(&self) -> SessionState;

    /// Connects and waits until the session is started.
    async fn start(&self) -> SessionResult<()>;

    /// Begins connecting; `Connected` is delivered as an event.
    fn start_async(&self) -> SessionResult<()>;

    /// Cancels pending work, disconnects and waits until the session is
    /// stopped. `Disconnected` is the last event delivered.
    async fn stop(&self) -> SessionResult<()>;

    /// Begins stopping without waiting.
    fn stop_async(&self) -> SessionResult<()>;

    /// Opens a queue and waits for the result.
    async fn open_queue_sync(&self, request: OpenQueueRequest) -> SessionResult<SessionEvent>;

    /// Sends an open request; the result arrives as `QueueOpenResult`.
    async fn open_queue(&self, request: OpenQueueRequest) -> SessionResult<CorrelationId>;

    /// Reconfigures an open queue and waits for the result.
    async fn configure_queue_sync(
        &self,
        request: ConfigureQueueRequest,
    ) -> SessionResult<SessionEvent>;

    /// Sends a configure request; the result arrives as
    /// `QueueConfigureResult`.
    async fn configure_queue(&self, request: ConfigureQueueRequest)
    -> SessionResult<CorrelationId>;

    /// Closes a queue and waits for the result.
    async fn close_queue_sync(&self, request: CloseQueueRequest) -> SessionResult<SessionEvent>;

    /// Sends a close request; the result arrives as `QueueCloseResult`.
    async fn close_queue(&self, request: CloseQueueRequest) -> SessionResult<CorrelationId>;

    /// Posts a built `Put` event. Messages on queues opened with ACK are
    /// acknowledged by one `Ack` message each, in post order.
    async fn post(&self, event: &MessageEvent) -> SessionResult<()>;

    /// Confirms a batch of delivered messages.
    async fn confirm(&self, batch: &ConfirmBatch) -> SessionResult<()>;

    /// Waits up to `timeout` for the next event.
    ///
    /// Returns a `Timeout` session event when none arrives. Only available
    /// when no event handler is registered.
    async fn next_event(&self, timeout: Duration) -> SessionResult<Event>;

    /// Returns a builder sized to the session's payload limit.
    fn create_message_event_builder(&self) -> MessageEventBuilder;

    /// Packs and posts one message, returning the correlation id its
    /// acknowledgement will carry.
    async fn post_message(
        &self,
        queue: &QueueId,
        message: PutMessage,
    ) -> SessionResult<CorrelationId> {
        let mut builder = self.create_message_event_builder();
        let correlation_id = builder.pack_message(queue, message)?;
        let event = builder.build()?;
        self.post(&event).await?;
        Ok(correlation_id)
    }

    /// Confirms one delivered message.
    async fn confirm_message(&self, message: &Message) -> SessionResult<()> {
        let mut builder = ConfirmEventBuilder::new();
        builder.add_message_confirmation(message)?;
        let batch = builder.build()?;
        self.confirm(&batch).await
    }
}
