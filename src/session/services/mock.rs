//! In-process session for application tests.
//!
//! [`MockSession`] runs the same state machine as [`super::Session`] but
//! talks to no broker. Outbound frames are recorded, broker results are
//! produced on demand by harness calls, and events wait in a queue until the
//! test reads them with `next_event` or emits them to a handler.

use super::api::QueueSession;
use super::delivery::{EventQueue, invoke};
use super::engine::{Delivery, FrameOutcome, SessionCore, StopProgress};
use super::{SessionError, SessionResult};
use crate::message::builder::{ConfirmBatch, MessageEventBuilder};
use crate::message::domain::{
    CodecSelection, CompressionAlgorithmType, CorrelationId, EncodingType, Event, MessageEvent,
    MessageGuid, ResultCode, SessionEvent, SessionEventType,
};
use crate::queue::domain::{QueueFlags, QueueId};
use crate::session::domain::{
    CloseQueueRequest, ConfigureQueueRequest, OpenQueueRequest, OperationKind, SessionOptions,
    SessionState,
};
use crate::session::ports::{EventHandler, InboundFrame, OperationResponse, OutboundFrame, PutFrame};
use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

const DELIVERED_CODEC: CodecSelection =
    CodecSelection::new(EncodingType::Raw, CompressionAlgorithmType::None);

/// Session double that records requests and resolves them on command.
///
/// Synchronous operations resolve immediately with the next scripted
/// result code, or `Success` when none is scripted. Asynchronous operations
/// stay pending until [`MockSession::complete_open`] and friends are called.
///
/// # Examples
///
/// ```
/// use mqsession::message::domain::ResultCode;
/// use mqsession::queue::domain::{QueueFlags, QueueId, Uri};
/// use mqsession::session::domain::OpenQueueRequest;
/// use mqsession::session::services::{MockSession, QueueSession};
///
/// # tokio::runtime::Runtime::new().expect("runtime").block_on(async {
/// let session = MockSession::new();
/// session.start().await.expect("start");
/// let queue = QueueId::auto();
/// let uri = Uri::parse("bmq://my.domain/queue1").expect("uri");
/// let result = session
///     .open_queue_sync(OpenQueueRequest::new(&queue, uri, QueueFlags::WRITE))
///     .await
///     .expect("open");
/// assert_eq!(result.status(), ResultCode::Success);
/// assert!(queue.is_valid());
/// # });
/// ```
pub struct MockSession<C = DefaultClock>
where
    C: Clock + Send + Sync + 'static,
{
    core: SessionCore<C>,
    events: EventQueue,
    handler: Option<Arc<dyn EventHandler>>,
    sent: Mutex<Vec<OutboundFrame>>,
    scripted: Mutex<VecDeque<ResultCode>>,
}

impl MockSession<DefaultClock> {
    /// Creates a mock session with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::assemble(SessionOptions::default(), Arc::new(DefaultClock))
    }
}

impl Default for MockSession<DefaultClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> MockSession<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates a mock session with explicit options and clock.
    ///
    /// Options are validated as for a live session, although the mock never
    /// connects.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] when `options` are invalid.
    pub fn with_clock(options: SessionOptions, clock: Arc<C>) -> SessionResult<Self> {
        options.validate()?;
        Ok(Self::assemble(options, clock))
    }

    fn assemble(options: SessionOptions, clock: Arc<C>) -> Self {
        let events = EventQueue::new(
            options.event_queue_low_watermark,
            options.event_queue_high_watermark,
        );
        Self {
            core: SessionCore::new(options, clock),
            events,
            handler: None,
            sent: Mutex::new(Vec::new()),
            scripted: Mutex::new(VecDeque::new()),
        }
    }

    /// Routes events to `handler` through [`Self::emit_events`] instead of
    /// `next_event`.
    #[must_use]
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Queues the result code of the next synchronous queue operation.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Internal`] if shared state is unusable.
    pub fn script_result(&self, status: ResultCode) -> SessionResult<()> {
        let mut scripted = self.scripted.lock().map_err(SessionError::internal)?;
        scripted.push_back(status);
        Ok(())
    }

    /// Returns every frame the session would have sent, in order.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Internal`] if shared state is unusable.
    pub fn sent_frames(&self) -> SessionResult<Vec<OutboundFrame>> {
        let sent = self.sent.lock().map_err(SessionError::internal)?;
        Ok(sent.clone())
    }

    /// Returns every posted message, in post order.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Internal`] if shared state is unusable.
    pub fn posted_messages(&self) -> SessionResult<Vec<PutFrame>> {
        let sent = self.sent.lock().map_err(SessionError::internal)?;
        Ok(sent
            .iter()
            .filter_map(|frame| match frame {
                OutboundFrame::Put(put) => Some(put.clone()),
                _ => None,
            })
            .collect())
    }

    /// Returns the number of operations awaiting a result.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Internal`] if shared state is unusable.
    pub fn pending_operations(&self) -> SessionResult<usize> {
        self.core.pending().len()
    }

    /// Resolves the oldest pending open on `queue` with `status`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoPendingOperation`] when no open is pending.
    pub fn complete_open(&self, queue: &QueueId, status: ResultCode) -> SessionResult<()> {
        self.respond(queue, OperationKind::Open, status, InboundFrame::OpenQueueResponse)
    }

    /// Resolves the oldest pending configure on `queue` with `status`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoPendingOperation`] when no configure is
    /// pending.
    pub fn complete_configure(&self, queue: &QueueId, status: ResultCode) -> SessionResult<()> {
        self.respond(
            queue,
            OperationKind::Configure,
            status,
            InboundFrame::ConfigureQueueResponse,
        )
    }

    /// Resolves the oldest pending close on `queue` with `status`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoPendingOperation`] when no close is pending.
    pub fn complete_close(&self, queue: &QueueId, status: ResultCode) -> SessionResult<()> {
        self.respond(queue, OperationKind::Close, status, InboundFrame::CloseQueueResponse)
    }

    /// Acknowledges the oldest unacknowledged post carrying
    /// `correlation_id` and returns the GUID assigned to it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoPendingOperation`] when no such post awaits
    /// acknowledgement.
    pub fn acknowledge(
        &self,
        correlation_id: &CorrelationId,
        status: ResultCode,
    ) -> SessionResult<MessageGuid> {
        let request = self
            .core
            .pending()
            .find_post(correlation_id)?
            .ok_or(SessionError::NoPendingOperation(OperationKind::Post))?;
        let guid = MessageGuid::new_random();
        let outcome = self.core.handle_frame(InboundFrame::Ack {
            request,
            guid,
            status,
        })?;
        self.absorb(outcome)?;
        Ok(guid)
    }

    /// Acknowledges every outstanding post, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Internal`] if shared state is unusable.
    pub fn acknowledge_all(&self, status: ResultCode) -> SessionResult<Vec<MessageGuid>> {
        let requests = self.core.pending().requests_of(OperationKind::Post)?;
        let mut guids = Vec::with_capacity(requests.len());
        for request in requests {
            let guid = MessageGuid::new_random();
            let outcome = self.core.handle_frame(InboundFrame::Ack {
                request,
                guid,
                status,
            })?;
            self.absorb(outcome)?;
            guids.push(guid);
        }
        Ok(guids)
    }

    /// Delivers `payloads` to a reader queue as one `Push` event and
    /// returns the GUIDs assigned to them.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::QueueNotOpened`] when `queue` is not open for
    /// reading in this session.
    pub fn deliver<I, P>(&self, queue: &QueueId, payloads: I) -> SessionResult<Vec<MessageGuid>>
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        let readable = queue.state().accepts_messages()
            && queue.flags().is_some_and(QueueFlags::is_reader);
        if !readable {
            return Err(SessionError::QueueNotOpened {
                state: queue.state(),
            });
        }
        let deliveries: Vec<Delivery> = payloads
            .into_iter()
            .map(|payload| Delivery {
                guid: MessageGuid::new_random(),
                payload: payload.into(),
                codec: DELIVERED_CODEC,
            })
            .collect();
        let guids = deliveries.iter().map(|delivery| delivery.guid).collect();
        let events = self.core.accept_deliveries(queue.key(), deliveries)?;
        if events.is_empty() {
            return Err(SessionError::QueueNotOpened {
                state: queue.state(),
            });
        }
        self.enqueue(events)?;
        Ok(guids)
    }

    /// Appends an arbitrary event to the undelivered queue.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Internal`] if shared state is unusable.
    pub fn enqueue_event(&self, event: Event) -> SessionResult<()> {
        self.events.push(event, self.core.now())
    }

    /// Hands up to `count` queued events to the registered handler and
    /// returns how many were emitted.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotSupported`] without a handler.
    pub fn emit_events(&self, count: usize) -> SessionResult<usize> {
        let handler = self
            .handler
            .as_ref()
            .ok_or(SessionError::NotSupported("emit_events requires an event handler"))?;
        let mut emitted = 0;
        while emitted < count {
            let Some(event) = self.events.try_pop(self.core.now())? else {
                break;
            };
            invoke(handler.as_ref(), &event);
            emitted += 1;
        }
        Ok(emitted)
    }

    /// Returns the queued events without consuming them.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Internal`] if shared state is unusable.
    pub fn undelivered_events(&self) -> SessionResult<Vec<Event>> {
        self.events.snapshot()
    }

    /// Drops the simulated connection: the session enters `Errored` and
    /// every pending operation resolves with `NotConnected`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Internal`] if shared state is unusable.
    pub fn simulate_connection_lost(&self, reason: &str) -> SessionResult<()> {
        let outcome = self.core.handle_frame(InboundFrame::ConnectionLost {
            reason: reason.to_owned(),
        })?;
        self.absorb(outcome)
    }

    /// Resolves every operation past its deadline with `Timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Internal`] if shared state is unusable.
    pub fn expire_pending(&self) -> SessionResult<()> {
        let events = self.core.expire_pending()?;
        self.enqueue(events)
    }

    fn respond(
        &self,
        queue: &QueueId,
        kind: OperationKind,
        status: ResultCode,
        frame: fn(OperationResponse) -> InboundFrame,
    ) -> SessionResult<()> {
        let request = self
            .core
            .pending()
            .find_for_queue(queue, kind)?
            .ok_or(SessionError::NoPendingOperation(kind))?;
        let outcome = self.core.handle_frame(frame(OperationResponse {
            request,
            status,
            description: None,
        }))?;
        self.absorb(outcome)
    }

    fn resolve_now(
        &self,
        frame: OutboundFrame,
        response: fn(OperationResponse) -> InboundFrame,
        mut result: oneshot::Receiver<SessionEvent>,
    ) -> SessionResult<SessionEvent> {
        let request = frame
            .request()
            .ok_or_else(|| SessionError::Internal("queue frame without request id".to_owned()))?;
        self.record([frame])?;
        let status = self.next_scripted()?;
        let outcome = self.core.handle_frame(response(OperationResponse {
            request,
            status,
            description: None,
        }))?;
        self.absorb(outcome)?;
        result.try_recv().map_err(|_| SessionError::Cancelled)
    }

    fn next_scripted(&self) -> SessionResult<ResultCode> {
        let mut scripted = self.scripted.lock().map_err(SessionError::internal)?;
        Ok(scripted.pop_front().unwrap_or(ResultCode::Success))
    }

    fn record(&self, frames: impl IntoIterator<Item = OutboundFrame>) -> SessionResult<()> {
        let mut sent = self.sent.lock().map_err(SessionError::internal)?;
        sent.extend(frames);
        Ok(())
    }

    fn absorb(&self, outcome: FrameOutcome) -> SessionResult<()> {
        self.record(outcome.replies)?;
        self.enqueue(outcome.events)
    }

    fn enqueue(&self, events: Vec<Event>) -> SessionResult<()> {
        let now = self.core.now();
        for event in events {
            self.events.push(event, now)?;
        }
        Ok(())
    }

    fn stop_now(&self) -> SessionResult<()> {
        if self.core.begin_stop()? == StopProgress::Done {
            return Ok(());
        }
        let cancelled = self.core.cancel_pending(ResultCode::Cancelled, "session stopped")?;
        self.enqueue(cancelled)?;
        let mut farewell = self.core.release_queues()?;
        farewell.push(OutboundFrame::Disconnect);
        self.record(farewell)?;
        let events = self.core.finish_stop()?;
        self.enqueue(events)
    }
}

#[async_trait]
impl<C> QueueSession for MockSession<C>
where
    C: Clock + Send + Sync + 'static,
{
    fn state(&self) -> SessionState {
        self.core.state()
    }

    async fn start(&self) -> SessionResult<()> {
        self.start_async()
    }

    fn start_async(&self) -> SessionResult<()> {
        self.core.begin_start()?;
        let events = self.core.finish_start()?;
        self.enqueue(events)
    }

    async fn stop(&self) -> SessionResult<()> {
        self.stop_now()
    }

    fn stop_async(&self) -> SessionResult<()> {
        self.stop_now()
    }

    async fn open_queue_sync(&self, request: OpenQueueRequest) -> SessionResult<SessionEvent> {
        let (waiter, result) = oneshot::channel();
        let issued = self.core.issue_open(&request, Some(waiter))?;
        self.resolve_now(issued.frame, InboundFrame::OpenQueueResponse, result)
    }

    async fn open_queue(&self, request: OpenQueueRequest) -> SessionResult<CorrelationId> {
        let issued = self.core.issue_open(&request, None)?;
        self.record([issued.frame])?;
        Ok(issued.correlation_id)
    }

    async fn configure_queue_sync(
        &self,
        request: ConfigureQueueRequest,
    ) -> SessionResult<SessionEvent> {
        let (waiter, result) = oneshot::channel();
        let issued = self.core.issue_configure(&request, Some(waiter))?;
        self.resolve_now(issued.frame, InboundFrame::ConfigureQueueResponse, result)
    }

    async fn configure_queue(
        &self,
        request: ConfigureQueueRequest,
    ) -> SessionResult<CorrelationId> {
        let issued = self.core.issue_configure(&request, None)?;
        self.record([issued.frame])?;
        Ok(issued.correlation_id)
    }

    async fn close_queue_sync(&self, request: CloseQueueRequest) -> SessionResult<SessionEvent> {
        let (waiter, result) = oneshot::channel();
        let issued = self.core.issue_close(&request, Some(waiter))?;
        self.resolve_now(issued.frame, InboundFrame::CloseQueueResponse, result)
    }

    async fn close_queue(&self, request: CloseQueueRequest) -> SessionResult<CorrelationId> {
        let issued = self.core.issue_close(&request, None)?;
        self.record([issued.frame])?;
        Ok(issued.correlation_id)
    }

    async fn post(&self, event: &MessageEvent) -> SessionResult<()> {
        let frames = self.core.issue_post(event)?;
        self.record(frames)
    }

    async fn confirm(&self, batch: &ConfirmBatch) -> SessionResult<()> {
        let frames = self.core.issue_confirm(batch)?;
        self.record(frames)
    }

    async fn next_event(&self, timeout: Duration) -> SessionResult<Event> {
        if self.handler.is_some() {
            return Err(SessionError::NotSupported(
                "next_event is unavailable when an event handler is registered",
            ));
        }
        if self.core.state().is_terminal() {
            return self
                .events
                .try_pop(self.core.now())?
                .ok_or_else(|| SessionError::InvalidState {
                    operation: "wait for events",
                    state: self.core.state(),
                });
        }
        let next = self.events.pop(timeout, || self.core.now()).await?;
        Ok(next.unwrap_or_else(|| {
            Event::Session(self.core.session_event(
                SessionEventType::Timeout,
                ResultCode::Timeout,
                CorrelationId::Unset,
            ))
        }))
    }

    fn create_message_event_builder(&self) -> MessageEventBuilder {
        MessageEventBuilder::with_max_payload_size(self.core.options().max_payload_size)
    }
}
