//! State shared by live and mock sessions.
//!
//! The core owns the session state machine, the registry of queues, and the
//! correlation table. It turns issued operations into outbound frames and
//! inbound frames into events. It never performs I/O: front-ends send the
//! frames it returns and deliver the events it produces.

use super::correlation::{Abandoned, CorrelationTable, PendingOperation};
use super::{SessionError, SessionResult};
use crate::message::builder::{BuilderError, ConfirmBatch};
use crate::message::codec::decode_payload;
use crate::message::domain::{
    CodecSelection, CorrelationId, Event, Message, MessageEvent, MessageEventType, MessageGuid,
    ResultCode, SessionEvent, SessionEventType,
};
use crate::queue::domain::{QueueBinding, QueueFlags, QueueId, QueueKey, QueueState};
use crate::session::domain::{
    CloseQueueRequest, ConfigureQueueRequest, OpenQueueRequest, OperationKind, RequestId,
    SessionOptions, SessionState,
};
use crate::session::ports::{InboundFrame, OperationResponse, OutboundFrame, PutFrame};
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// How a stop request should proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopProgress {
    /// The session moved to `Stopping`; the caller must finish the stop.
    Proceed,
    /// Nothing to tear down; the session is already terminal or stopping.
    Done,
}

/// A tracked request ready to send.
#[derive(Debug)]
pub(crate) struct IssuedOperation {
    pub(crate) request: RequestId,
    pub(crate) correlation_id: CorrelationId,
    pub(crate) frame: OutboundFrame,
}

/// What one inbound frame produced: events to deliver and frames to send
/// back to the broker.
#[derive(Debug, Default)]
pub(crate) struct FrameOutcome {
    pub(crate) events: Vec<Event>,
    pub(crate) replies: Vec<OutboundFrame>,
}

impl From<Vec<Event>> for FrameOutcome {
    fn from(events: Vec<Event>) -> Self {
        Self {
            events,
            replies: Vec::new(),
        }
    }
}

/// One delivered message as received from the broker.
#[derive(Debug, Clone)]
pub(crate) struct Delivery {
    pub(crate) guid: MessageGuid,
    pub(crate) payload: Vec<u8>,
    pub(crate) codec: CodecSelection,
}

pub(crate) struct SessionCore<C> {
    options: SessionOptions,
    clock: Arc<C>,
    state: Mutex<SessionState>,
    queues: Mutex<HashMap<QueueKey, QueueId>>,
    pending: CorrelationTable,
}

impl<C> SessionCore<C>
where
    C: Clock + Send + Sync,
{
    pub(crate) fn new(options: SessionOptions, clock: Arc<C>) -> Self {
        Self {
            options,
            clock,
            state: Mutex::new(SessionState::Unstarted),
            queues: Mutex::new(HashMap::new()),
            pending: CorrelationTable::default(),
        }
    }

    pub(crate) const fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub(crate) const fn pending(&self) -> &CorrelationTable {
        &self.pending
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.lock_state()
    }

    pub(crate) fn session_event(
        &self,
        event_type: SessionEventType,
        status: ResultCode,
        correlation_id: CorrelationId,
    ) -> SessionEvent {
        SessionEvent::new(event_type, status, correlation_id, self.now())
    }

    // Lifecycle

    pub(crate) fn begin_start(&self) -> SessionResult<()> {
        let mut state = self.lock_state();
        Self::transition(&mut state, SessionState::Starting, "start")
    }

    pub(crate) fn finish_start(&self) -> SessionResult<Vec<Event>> {
        let mut state = self.lock_state();
        Self::transition(&mut state, SessionState::Started, "finish starting")?;
        drop(state);
        tracing::info!(broker = %self.options.broker_uri, "session started");
        Ok(vec![Event::Session(self.session_event(
            SessionEventType::Connected,
            ResultCode::Success,
            CorrelationId::Unset,
        ))])
    }

    /// Rolls a failed start back to `Unstarted`, or to `Errored` when the
    /// failure is fatal.
    pub(crate) fn abort_start(&self, fatal: bool, reason: &str) -> SessionResult<()> {
        let mut state = self.lock_state();
        let target = if fatal {
            SessionState::Errored
        } else {
            SessionState::Unstarted
        };
        Self::transition(&mut state, target, "abort starting")?;
        tracing::warn!(reason, state = %target, "session start failed");
        Ok(())
    }

    pub(crate) fn begin_stop(&self) -> SessionResult<StopProgress> {
        let mut state = self.lock_state();
        match *state {
            SessionState::Started => {
                Self::transition(&mut state, SessionState::Stopping, "stop")?;
                tracing::info!("session stopping");
                Ok(StopProgress::Proceed)
            }
            SessionState::Unstarted => {
                Self::transition(&mut state, SessionState::Stopped, "stop")?;
                Ok(StopProgress::Done)
            }
            SessionState::Stopping | SessionState::Stopped | SessionState::Errored => {
                Ok(StopProgress::Done)
            }
            SessionState::Starting => Err(SessionError::InvalidState {
                operation: "stop",
                state: *state,
            }),
        }
    }

    pub(crate) fn finish_stop(&self) -> SessionResult<Vec<Event>> {
        let mut state = self.lock_state();
        Self::transition(&mut state, SessionState::Stopped, "finish stopping")?;
        drop(state);
        tracing::info!("session stopped");
        Ok(vec![Event::Session(self.session_event(
            SessionEventType::Disconnected,
            ResultCode::Success,
            CorrelationId::Unset,
        ))])
    }

    /// Moves a live session to `Errored`, resolving everything pending with
    /// `NotConnected`.
    pub(crate) fn enter_errored(
        &self,
        event_type: SessionEventType,
        reason: &str,
    ) -> SessionResult<Vec<Event>> {
        let mut state = self.lock_state();
        if !matches!(*state, SessionState::Starting | SessionState::Started) {
            tracing::debug!(reason, state = %*state, "ignoring transport failure");
            return Ok(Vec::new());
        }
        Self::transition(&mut state, SessionState::Errored, "enter errored")?;
        drop(state);
        tracing::error!(reason, "session transport failed");

        let mut events = vec![Event::Session(
            self.session_event(event_type, ResultCode::NotConnected, CorrelationId::Unset)
                .with_error_description(reason),
        )];
        events.extend(self.cancel_pending(ResultCode::NotConnected, reason)?);
        self.release_queues()?;
        Ok(events)
    }

    /// Resolves every pending operation with `status`, oldest first.
    pub(crate) fn cancel_pending(
        &self,
        status: ResultCode,
        reason: &str,
    ) -> SessionResult<Vec<Event>> {
        let drained = self.pending.drain()?;
        let mut events = Vec::with_capacity(drained.len());
        for (request, operation) in drained {
            tracing::warn!(
                request = %request,
                kind = %operation.kind,
                status = %status,
                "resolving pending operation without a broker response"
            );
            events.extend(self.settle(
                operation,
                status,
                Some(reason),
                MessageGuid::UNSET,
            )?);
        }
        Ok(events)
    }

    /// Forces every registered queue closed and returns close frames for the
    /// queues the broker still considers open.
    pub(crate) fn release_queues(&self) -> SessionResult<Vec<OutboundFrame>> {
        let mut queues = self.queues.lock().map_err(SessionError::internal)?;
        let mut frames = Vec::new();
        let mut released: Vec<QueueId> = queues.drain().map(|(_, queue)| queue).collect();
        released.sort_by_key(QueueId::key);
        for queue in released {
            if queue.is_valid() {
                frames.push(OutboundFrame::CloseQueue {
                    request: self.pending.next_request_id(),
                    queue: queue.key(),
                });
            }
            queue.invalidate();
        }
        Ok(frames)
    }

    // Queue operations

    pub(crate) fn issue_open(
        &self,
        request: &OpenQueueRequest,
        waiter: Option<oneshot::Sender<SessionEvent>>,
    ) -> SessionResult<IssuedOperation> {
        let _started = self.started_guard("open a queue")?;
        let queue = request.queue();
        request.flags().validate()?;
        let options = request
            .options()
            .cloned()
            .unwrap_or_else(|| self.options.default_queue_options.clone());
        options.validate_for(request.flags())?;

        {
            let mut queues = self.queues.lock().map_err(SessionError::internal)?;
            let clash = queues.values().any(|other| {
                other != queue
                    && other.state() != QueueState::Closed
                    && other.correlation_id() == queue.correlation_id()
            });
            if clash {
                return Err(SessionError::CorrelationIdNotUnique(
                    queue.correlation_id().clone(),
                ));
            }
            queue.begin_open(QueueBinding::new(
                request.uri().clone(),
                request.flags(),
                options.clone(),
            ))?;
            queues.insert(queue.key(), queue.clone());
        }

        let (request_id, correlation_id) = self.track(
            OperationKind::Open,
            queue,
            request.correlation_id(),
            self.options.open_queue_timeout,
            waiter,
        )?;
        tracing::debug!(
            request = %request_id,
            uri = %request.uri(),
            flags = %request.flags(),
            "issuing queue open"
        );
        Ok(IssuedOperation {
            request: request_id,
            correlation_id,
            frame: OutboundFrame::OpenQueue {
                request: request_id,
                queue: queue.key(),
                uri: request.uri().clone(),
                flags: request.flags(),
                options,
            },
        })
    }

    pub(crate) fn issue_configure(
        &self,
        request: &ConfigureQueueRequest,
        waiter: Option<oneshot::Sender<SessionEvent>>,
    ) -> SessionResult<IssuedOperation> {
        let _started = self.started_guard("configure a queue")?;
        let queue = request.queue();
        self.ensure_registered(queue)?;
        let flags = queue.flags().ok_or(SessionError::QueueNotOpened {
            state: queue.state(),
        })?;
        let options = request.options();
        options.validate_for(flags)?;
        queue.begin_configure(options.clone())?;

        let (request_id, correlation_id) = self.track(
            OperationKind::Configure,
            queue,
            request.correlation_id(),
            self.options.configure_queue_timeout,
            waiter,
        )?;
        tracing::debug!(
            request = %request_id,
            queue = %queue,
            subscriptions = options.subscriptions().count(),
            "issuing queue configure"
        );
        Ok(IssuedOperation {
            request: request_id,
            correlation_id,
            frame: OutboundFrame::ConfigureQueue {
                request: request_id,
                queue: queue.key(),
                options: options.clone(),
            },
        })
    }

    pub(crate) fn issue_close(
        &self,
        request: &CloseQueueRequest,
        waiter: Option<oneshot::Sender<SessionEvent>>,
    ) -> SessionResult<IssuedOperation> {
        let _started = self.started_guard("close a queue")?;
        let queue = request.queue();
        self.ensure_registered(queue)?;
        queue.begin_close()?;

        let (request_id, correlation_id) = self.track(
            OperationKind::Close,
            queue,
            request.correlation_id(),
            self.options.close_queue_timeout,
            waiter,
        )?;
        tracing::debug!(request = %request_id, queue = %queue, "issuing queue close");
        Ok(IssuedOperation {
            request: request_id,
            correlation_id,
            frame: OutboundFrame::CloseQueue {
                request: request_id,
                queue: queue.key(),
            },
        })
    }

    /// Turns a `Put` event into one frame per message, in batch order.
    ///
    /// Every message is checked before any frame is produced, so a rejected
    /// batch posts nothing.
    pub(crate) fn issue_post(&self, event: &MessageEvent) -> SessionResult<Vec<OutboundFrame>> {
        let _started = self.started_guard("post")?;
        if event.event_type() != MessageEventType::Put {
            return Err(SessionError::NotPostable(event.event_type()));
        }

        let mut accepted = Vec::with_capacity(event.len());
        for message in event.messages() {
            let queue = message.queue().ok_or(SessionError::QueueNotOpened {
                state: QueueState::Closed,
            })?;
            let binding = self.open_binding(queue)?;
            if !binding.flags().is_writer() {
                return Err(SessionError::Builder(BuilderError::QueueReadOnly));
            }
            accepted.push((message, queue, binding.flags().is_ack()));
        }

        let mut frames = Vec::with_capacity(accepted.len());
        for (message, queue, ack_requested) in accepted {
            let request = self.pending.next_request_id();
            if ack_requested {
                self.pending.insert(
                    request,
                    PendingOperation {
                        kind: OperationKind::Post,
                        queue: queue.clone(),
                        correlation_id: message.correlation_id().clone(),
                        deadline: None,
                        waiter: None,
                    },
                )?;
            }
            frames.push(OutboundFrame::Put(PutFrame {
                request,
                queue: queue.key(),
                payload: message.payload().to_vec(),
                codec: message.codec(),
                correlation_id: message.correlation_id().clone(),
                ack_requested,
            }));
        }
        tracing::debug!(messages = frames.len(), "issuing post");
        Ok(frames)
    }

    pub(crate) fn issue_confirm(&self, batch: &ConfirmBatch) -> SessionResult<Vec<OutboundFrame>> {
        let _started = self.started_guard("confirm")?;
        let mut frames = Vec::with_capacity(batch.len());
        for confirmation in batch.confirmations() {
            let binding = self.open_binding(confirmation.queue())?;
            if !binding.flags().is_reader() {
                return Err(SessionError::Builder(BuilderError::QueueNotReader));
            }
            frames.push(OutboundFrame::Confirm {
                queue: confirmation.queue().key(),
                guid: confirmation.guid(),
            });
        }
        Ok(frames)
    }

    /// Removes an operation whose frame never reached the broker and rolls
    /// its queue transition back. The caller reports the failure instead of
    /// an event.
    pub(crate) fn withdraw(&self, request: RequestId) -> SessionResult<()> {
        if let Some(operation) = self.pending.remove(request)? {
            tracing::debug!(request = %request, kind = %operation.kind, "withdrawing operation");
            self.conclude(&operation, false)?;
        }
        Ok(())
    }

    /// Resolves `request` with `Timeout` on behalf of a synchronous caller
    /// whose wait elapsed. Returns `None` if another path resolved it first.
    pub(crate) fn expire_request(&self, request: RequestId) -> SessionResult<Option<SessionEvent>> {
        let Some(mut operation) = self.pending.remove(request)? else {
            return Ok(None);
        };
        tracing::warn!(request = %request, kind = %operation.kind, "operation timed out");
        operation.waiter = None;
        self.abandon(request, &operation)?;
        self.conclude(&operation, false)?;
        Ok(Some(self.queue_result_event(
            &operation,
            ResultCode::Timeout,
            Some("operation timed out"),
        )))
    }

    /// Resolves every operation whose deadline has passed with `Timeout`.
    pub(crate) fn expire_pending(&self) -> SessionResult<Vec<Event>> {
        let expired = self.pending.take_expired(self.now())?;
        let mut events = Vec::new();
        for (request, operation) in expired {
            tracing::warn!(request = %request, kind = %operation.kind, "operation timed out");
            self.abandon(request, &operation)?;
            events.extend(self.settle(
                operation,
                ResultCode::Timeout,
                Some("operation timed out"),
                MessageGuid::UNSET,
            )?);
        }
        Ok(events)
    }

    // Inbound frames

    pub(crate) fn handle_frame(&self, frame: InboundFrame) -> SessionResult<FrameOutcome> {
        tracing::debug!(frame = frame.name(), "dispatching inbound frame");
        match frame {
            InboundFrame::OpenQueueResponse(response) => {
                self.complete_operation(OperationKind::Open, response)
            }
            InboundFrame::ConfigureQueueResponse(response) => {
                self.complete_operation(OperationKind::Configure, response)
            }
            InboundFrame::CloseQueueResponse(response) => {
                self.complete_operation(OperationKind::Close, response)
            }
            InboundFrame::Ack {
                request,
                guid,
                status,
            } => self.complete_post(request, guid, status).map(FrameOutcome::from),
            InboundFrame::Push {
                queue,
                guid,
                payload,
                codec,
            } => self
                .accept_deliveries(
                    queue,
                    vec![Delivery {
                        guid,
                        payload,
                        codec,
                    }],
                )
                .map(FrameOutcome::from),
            InboundFrame::ConnectionLost { reason } => self
                .enter_errored(SessionEventType::ConnectionLost, &reason)
                .map(FrameOutcome::from),
        }
    }

    /// Builds one `Push` event from deliveries to a registered reader queue.
    ///
    /// Deliveries that fail to decode, or decode past the session's
    /// `max_payload_size`, are left out and reported as `Error` events.
    pub(crate) fn accept_deliveries(
        &self,
        key: QueueKey,
        deliveries: Vec<Delivery>,
    ) -> SessionResult<Vec<Event>> {
        let Some(queue) = self.registered(key)? else {
            tracing::warn!(queue = %key, "dropping delivery for unknown queue");
            return Ok(Vec::new());
        };
        let readable = queue.state().accepts_messages()
            && queue.flags().is_some_and(QueueFlags::is_reader);
        if !readable {
            tracing::warn!(queue = %queue, "dropping delivery for queue not open for reading");
            return Ok(Vec::new());
        }

        let limit = self.options.max_payload_size;
        let mut messages = Vec::with_capacity(deliveries.len());
        let mut rejected = Vec::new();
        for delivery in deliveries {
            match decode_payload(delivery.payload, delivery.codec, limit) {
                Ok(payload) => messages.push(Message::push(
                    queue.clone(),
                    payload,
                    delivery.guid,
                    delivery.codec,
                )),
                Err(err) => {
                    tracing::warn!(queue = %queue, guid = %delivery.guid, error = %err, "dropping undecodable delivery");
                    rejected.push(Event::Session(
                        self.session_event(
                            SessionEventType::Error,
                            ResultCode::InvalidArgument,
                            queue.correlation_id().clone(),
                        )
                        .with_queue(queue.clone())
                        .with_error_description(err.to_string()),
                    ));
                }
            }
        }
        let mut events = Vec::with_capacity(rejected.len() + 1);
        if !messages.is_empty() {
            events.push(Event::Message(MessageEvent::new(
                MessageEventType::Push,
                messages,
            )));
        }
        events.extend(rejected);
        Ok(events)
    }

    fn complete_operation(
        &self,
        expected: OperationKind,
        response: OperationResponse,
    ) -> SessionResult<FrameOutcome> {
        let Some(operation) = self.pending.remove(response.request)? else {
            return self.late_response(expected, &response);
        };
        if operation.kind != expected {
            tracing::warn!(
                request = %response.request,
                expected = %expected,
                pending = %operation.kind,
                "response kind does not match pending operation"
            );
            self.pending.insert(response.request, operation)?;
            return Ok(FrameOutcome::default());
        }
        tracing::debug!(request = %response.request, kind = %expected, status = %response.status, "operation resolved");
        let events: Vec<Event> = self
            .settle(
                operation,
                response.status,
                response.description.as_deref(),
                MessageGuid::UNSET,
            )?
            .into_iter()
            .collect();
        Ok(events.into())
    }

    /// Handles a response to a request that was already resolved locally.
    ///
    /// A successful open whose caller timed out left the queue open on the
    /// broker while the session reports it closed; a close is sent to undo
    /// it unless the queue was opened again in the meantime.
    fn late_response(
        &self,
        kind: OperationKind,
        response: &OperationResponse,
    ) -> SessionResult<FrameOutcome> {
        let Some(marker) = self.pending.take_abandoned(response.request)? else {
            tracing::warn!(request = %response.request, kind = %kind, "response for unknown request");
            return Ok(FrameOutcome::default());
        };
        let Abandoned::Open(queue) = marker else {
            tracing::debug!(request = %response.request, status = %response.status, "rollback close answered");
            return Ok(FrameOutcome::default());
        };
        if kind != OperationKind::Open || !response.status.is_success() {
            tracing::debug!(request = %response.request, status = %response.status, "late open result ignored");
            return Ok(FrameOutcome::default());
        }
        if self.registered(queue)?.is_some() {
            tracing::warn!(request = %response.request, queue = %queue, "queue reopened before the late open result");
            return Ok(FrameOutcome::default());
        }
        let request = self.pending.next_request_id();
        self.pending.abandon(request, Abandoned::Rollback)?;
        tracing::info!(
            request = %response.request,
            rollback = %request,
            queue = %queue,
            "closing queue opened after its request timed out"
        );
        Ok(FrameOutcome {
            events: Vec::new(),
            replies: vec![OutboundFrame::CloseQueue { request, queue }],
        })
    }

    fn complete_post(
        &self,
        request: RequestId,
        guid: MessageGuid,
        status: ResultCode,
    ) -> SessionResult<Vec<Event>> {
        let Some(operation) = self.pending.remove(request)? else {
            tracing::warn!(request = %request, "acknowledgement for unknown post");
            return Ok(Vec::new());
        };
        if operation.kind != OperationKind::Post {
            tracing::warn!(request = %request, pending = %operation.kind, "acknowledgement for non-post request");
            self.pending.insert(request, operation)?;
            return Ok(Vec::new());
        }
        Ok(self
            .settle(operation, status, None, guid)?
            .into_iter()
            .collect())
    }

    /// Applies the outcome of a removed operation and produces its event.
    ///
    /// Queue results go to the synchronous waiter when one is attached and
    /// still listening; otherwise they are returned for delivery.
    fn settle(
        &self,
        operation: PendingOperation,
        status: ResultCode,
        description: Option<&str>,
        guid: MessageGuid,
    ) -> SessionResult<Option<Event>> {
        if operation.kind == OperationKind::Post {
            let ack = Message::ack(operation.queue, guid, operation.correlation_id, status);
            return Ok(Some(Event::Message(MessageEvent::new(
                MessageEventType::Ack,
                vec![ack],
            ))));
        }

        self.conclude(&operation, status.is_success())?;
        let event = self.queue_result_event(&operation, status, description);
        if let Some(waiter) = operation.waiter {
            return Ok(waiter.send(event).err().map(Event::Session));
        }
        Ok(Some(Event::Session(event)))
    }

    fn abandon(&self, request: RequestId, operation: &PendingOperation) -> SessionResult<()> {
        if operation.kind == OperationKind::Open {
            self.pending
                .abandon(request, Abandoned::Open(operation.queue.key()))?;
        }
        Ok(())
    }

    /// Applies the outcome to the queue and forgets it once closed.
    fn conclude(&self, operation: &PendingOperation, success: bool) -> SessionResult<()> {
        Self::apply_outcome(operation, success);
        if operation.kind != OperationKind::Post && operation.queue.state() == QueueState::Closed {
            self.unregister(&operation.queue)?;
        }
        Ok(())
    }

    fn apply_outcome(operation: &PendingOperation, success: bool) {
        let queue = &operation.queue;
        let outcome = match operation.kind {
            OperationKind::Open => queue.complete_open(success),
            OperationKind::Configure => queue.complete_configure(success),
            OperationKind::Close => queue.complete_close(success),
            OperationKind::Post => return,
        };
        if let Err(err) = outcome {
            tracing::warn!(queue = %queue, error = %err, "queue state changed before the result arrived");
        }
    }

    fn queue_result_event(
        &self,
        operation: &PendingOperation,
        status: ResultCode,
        description: Option<&str>,
    ) -> SessionEvent {
        let event_type = match operation.kind {
            OperationKind::Open => SessionEventType::QueueOpenResult,
            OperationKind::Configure => SessionEventType::QueueConfigureResult,
            OperationKind::Close => SessionEventType::QueueCloseResult,
            OperationKind::Post => SessionEventType::Error,
        };
        let event = self
            .session_event(event_type, status, operation.correlation_id.clone())
            .with_queue(operation.queue.clone());
        if let Some(text) = description {
            return event.with_error_description(text);
        }
        event
    }

    // Helpers

    fn track(
        &self,
        kind: OperationKind,
        queue: &QueueId,
        correlation_id: Option<&CorrelationId>,
        timeout: Duration,
        waiter: Option<oneshot::Sender<SessionEvent>>,
    ) -> SessionResult<(RequestId, CorrelationId)> {
        let request = self.pending.next_request_id();
        let correlation = correlation_id
            .cloned()
            .unwrap_or_else(|| queue.correlation_id().clone());
        self.pending.insert(
            request,
            PendingOperation {
                kind,
                queue: queue.clone(),
                correlation_id: correlation.clone(),
                deadline: self.deadline(timeout),
                waiter,
            },
        )?;
        Ok((request, correlation))
    }

    fn deadline(&self, timeout: Duration) -> Option<DateTime<Utc>> {
        TimeDelta::from_std(timeout)
            .ok()
            .and_then(|delta| self.now().checked_add_signed(delta))
    }

    fn started_guard(&self, operation: &'static str) -> SessionResult<MutexGuard<'_, SessionState>> {
        let state = self.lock_state();
        if state.accepts_operations() {
            Ok(state)
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: *state,
            })
        }
    }

    fn open_binding(&self, queue: &QueueId) -> SessionResult<QueueBinding> {
        self.ensure_registered(queue)?;
        match queue.snapshot() {
            (state, Some(binding)) if state.accepts_messages() => Ok(binding),
            (state, _) => Err(SessionError::QueueNotOpened { state }),
        }
    }

    fn ensure_registered(&self, queue: &QueueId) -> SessionResult<()> {
        if self.registered(queue.key())?.is_some_and(|known| &known == queue) {
            Ok(())
        } else {
            Err(SessionError::QueueNotOpened {
                state: QueueState::Closed,
            })
        }
    }

    fn registered(&self, key: QueueKey) -> SessionResult<Option<QueueId>> {
        let queues = self.queues.lock().map_err(SessionError::internal)?;
        Ok(queues.get(&key).cloned())
    }

    fn unregister(&self, queue: &QueueId) -> SessionResult<()> {
        let mut queues = self.queues.lock().map_err(SessionError::internal)?;
        queues.remove(&queue.key());
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(
        state: &mut SessionState,
        target: SessionState,
        operation: &'static str,
    ) -> SessionResult<()> {
        if !state.can_transition_to(target) {
            return Err(SessionError::InvalidState {
                operation,
                state: *state,
            });
        }
        tracing::debug!(from = %*state, to = %target, "session state change");
        *state = target;
        Ok(())
    }
}
