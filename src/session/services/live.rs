//! Session backed by a broker transport.
//!
//! A started session runs one dispatcher task. It reads inbound frames,
//! sweeps timed-out operations and delivers every event, so handlers and the
//! pull queue observe a single ordered stream.

use super::api::QueueSession;
use super::delivery::{EventQueue, EventSink};
use super::engine::{FrameOutcome, IssuedOperation, SessionCore, StopProgress};
use super::{SessionError, SessionResult};
use crate::message::builder::{ConfirmBatch, MessageEventBuilder};
use crate::message::domain::{
    CorrelationId, Event, MessageEvent, ResultCode, SessionEvent, SessionEventType,
};
use crate::session::domain::{
    BrokerEndpoint, CloseQueueRequest, ConfigureQueueRequest, OpenQueueRequest, RequestId,
    SessionOptions, SessionState,
};
use crate::session::ports::{EventHandler, InboundFrame, OutboundFrame, Transport, TransportError};
use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// How often the dispatcher looks for operations past their deadline.
const TIMEOUT_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

enum DispatchCommand {
    Deliver(Vec<Event>),
    Shutdown,
}

struct Dispatcher {
    commands: mpsc::UnboundedSender<DispatchCommand>,
    task: JoinHandle<()>,
}

struct Shared<T, C> {
    core: Arc<SessionCore<C>>,
    transport: Arc<T>,
    endpoint: BrokerEndpoint,
    sink: EventSink,
    pull_queue: Option<Arc<EventQueue>>,
    dispatcher: Mutex<Option<Dispatcher>>,
}

/// Client session connected to a broker through a [`Transport`].
///
/// Events go to the [`EventHandler`] given at construction, or, without
/// one, to a pull queue drained by [`QueueSession::next_event`]. Clones
/// share the same session.
pub struct Session<T, C = DefaultClock>
where
    T: Transport,
    C: Clock + Send + Sync + 'static,
{
    shared: Arc<Shared<T, C>>,
}

impl<T, C> Clone for Session<T, C>
where
    T: Transport,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Session<T, DefaultClock>
where
    T: Transport,
{
    /// Creates a session that queues events for [`QueueSession::next_event`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] when `options` are invalid.
    pub fn new(transport: Arc<T>, options: SessionOptions) -> SessionResult<Self> {
        Self::with_clock(transport, options, Arc::new(DefaultClock), None)
    }

    /// Creates a session that hands events to `handler` on its dispatcher
    /// task.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] when `options` are invalid.
    pub fn with_handler(
        transport: Arc<T>,
        options: SessionOptions,
        handler: Arc<dyn EventHandler>,
    ) -> SessionResult<Self> {
        Self::with_clock(transport, options, Arc::new(DefaultClock), Some(handler))
    }
}

impl<T, C> Session<T, C>
where
    T: Transport,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a session with an explicit clock and optional handler.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] when `options` are invalid.
    pub fn with_clock(
        transport: Arc<T>,
        options: SessionOptions,
        clock: Arc<C>,
        handler: Option<Arc<dyn EventHandler>>,
    ) -> SessionResult<Self> {
        options.validate()?;
        let endpoint = options.endpoint()?;
        let (sink, pull_queue) = handler.map_or_else(
            || {
                let queue = Arc::new(EventQueue::new(
                    options.event_queue_low_watermark,
                    options.event_queue_high_watermark,
                ));
                (EventSink::Queue(Arc::clone(&queue)), Some(queue))
            },
            |registered| (EventSink::Handler(registered), None),
        );
        Ok(Self {
            shared: Arc::new(Shared {
                core: Arc::new(SessionCore::new(options, clock)),
                transport,
                endpoint,
                sink,
                pull_queue,
                dispatcher: Mutex::new(None),
            }),
        })
    }

    /// Returns the options the session was created with.
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        self.shared.core.options()
    }

    /// Returns the number of operations awaiting a broker response.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Internal`] if shared state is unusable.
    pub fn pending_operations(&self) -> SessionResult<usize> {
        self.shared.core.pending().len()
    }
}

impl<T, C> Shared<T, C>
where
    T: Transport,
    C: Clock + Send + Sync + 'static,
{
    async fn connect(&self) -> SessionResult<()> {
        tracing::info!(endpoint = %self.endpoint, "connecting to broker");
        let attempt = tokio::time::timeout(
            self.core.options().connect_timeout,
            self.transport.connect(&self.endpoint),
        )
        .await;
        let inbound = match attempt {
            Ok(Ok(inbound)) => inbound,
            Ok(Err(err)) => {
                self.core.abort_start(err.is_fatal(), err.message())?;
                return Err(err.into());
            }
            Err(_) => {
                self.core.abort_start(false, "connect timed out")?;
                return Err(SessionError::Timeout);
            }
        };

        let (commands, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_dispatcher(
            Arc::clone(&self.core),
            Arc::clone(&self.transport),
            self.sink.clone(),
            inbound,
            receiver,
        ));
        *self.lock_dispatcher() = Some(Dispatcher { commands, task });
        let events = self.core.finish_start()?;
        self.dispatch(events);
        Ok(())
    }

    async fn finish_stop(&self) -> SessionResult<()> {
        let cancelled = self.core.cancel_pending(ResultCode::Cancelled, "session stopped")?;
        self.dispatch(cancelled);

        let mut farewell = self.core.release_queues()?;
        farewell.push(OutboundFrame::Disconnect);
        for frame in farewell {
            let name = frame.name();
            if let Err(err) = self.transport.send(frame).await {
                tracing::warn!(frame = name, error = %err, "failed to send shutdown frame");
                if err.is_fatal() {
                    break;
                }
            }
        }
        if let Err(err) = self.transport.disconnect().await {
            tracing::warn!(error = %err, "transport disconnect failed");
        }

        let events = self.core.finish_stop()?;
        self.dispatch(events);
        self.shutdown_dispatcher().await;
        Ok(())
    }

    async fn shutdown_dispatcher(&self) {
        let active = self.lock_dispatcher().take();
        if let Some(dispatcher) = active {
            if dispatcher.commands.send(DispatchCommand::Shutdown).is_err() {
                tracing::debug!("dispatcher already stopped");
            }
            if let Err(err) = dispatcher.task.await {
                tracing::warn!(error = %err, "dispatcher task failed");
            }
        }
    }

    async fn send_request(&self, issued: IssuedOperation) -> SessionResult<CorrelationId> {
        let name = issued.frame.name();
        if let Err(err) = self.transport.send(issued.frame).await {
            tracing::warn!(frame = name, request = %issued.request, error = %err, "send failed");
            self.core.withdraw(issued.request)?;
            self.on_send_failure(&err)?;
            return Err(err.into());
        }
        Ok(issued.correlation_id)
    }

    async fn send_all(&self, frames: Vec<OutboundFrame>) -> SessionResult<()> {
        let requests: Vec<Option<RequestId>> = frames.iter().map(OutboundFrame::request).collect();
        for (position, frame) in frames.into_iter().enumerate() {
            if let Err(err) = self.transport.send(frame).await {
                tracing::warn!(error = %err, sent = position, "batch send failed");
                for request in requests.iter().skip(position).flatten() {
                    self.core.withdraw(*request)?;
                }
                self.on_send_failure(&err)?;
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn on_send_failure(&self, err: &TransportError) -> SessionResult<()> {
        if err.is_fatal() {
            let events = self
                .core
                .enter_errored(SessionEventType::ConnectionLost, err.message())?;
            self.dispatch(events);
        }
        Ok(())
    }

    async fn await_result(
        &self,
        request: RequestId,
        mut result: oneshot::Receiver<SessionEvent>,
        timeout: Duration,
    ) -> SessionResult<SessionEvent> {
        let waited = tokio::time::timeout(
            timeout.saturating_add(TIMEOUT_SWEEP_INTERVAL),
            &mut result,
        )
        .await;
        if let Ok(outcome) = waited {
            return outcome.map_err(|_| SessionError::Cancelled);
        }
        if let Some(event) = self.core.expire_request(request)? {
            return Ok(event);
        }
        result.try_recv().map_err(|_| SessionError::Cancelled)
    }

    /// Hands events to the dispatcher, or delivers them directly when no
    /// dispatcher is running.
    fn dispatch(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let sender = self
            .lock_dispatcher()
            .as_ref()
            .map(|active| active.commands.clone());
        let Some(commands) = sender else {
            self.deliver_now(events);
            return;
        };
        if let Err(SendError(DispatchCommand::Deliver(unsent))) =
            commands.send(DispatchCommand::Deliver(events))
        {
            self.deliver_now(unsent);
        }
    }

    fn deliver_now(&self, events: Vec<Event>) {
        if let Err(err) = self.sink.deliver(events, self.core.now()) {
            tracing::error!(error = %err, "event delivery failed");
        }
    }

    /// Returns whether events may still reach the pull queue.
    fn dispatcher_running(&self) -> bool {
        self.lock_dispatcher()
            .as_ref()
            .is_some_and(|active| !active.task.is_finished())
    }

    fn lock_dispatcher(&self) -> MutexGuard<'_, Option<Dispatcher>> {
        self.dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_dispatcher<T, C>(
    core: Arc<SessionCore<C>>,
    transport: Arc<T>,
    sink: EventSink,
    mut inbound: mpsc::Receiver<InboundFrame>,
    mut commands: mpsc::UnboundedReceiver<DispatchCommand>,
) where
    T: Transport,
    C: Clock + Send + Sync + 'static,
{
    let mut sweep = tokio::time::interval(TIMEOUT_SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut inbound_open = true;
    tracing::debug!("dispatcher started");

    loop {
        let produced = tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(DispatchCommand::Deliver(events)) => Ok(FrameOutcome::from(events)),
                Some(DispatchCommand::Shutdown) | None => break,
            },
            frame = inbound.recv(), if inbound_open => {
                inbound_open = frame.is_some();
                frame.map_or_else(
                    || core
                        .enter_errored(SessionEventType::ConnectionLost, "broker connection closed")
                        .map(FrameOutcome::from),
                    |received| core.handle_frame(received),
                )
            },
            _ = sweep.tick() => core.expire_pending().map(FrameOutcome::from),
        };
        let delivered = produced.and_then(|outcome| {
            send_replies(&transport, outcome.replies);
            sink.deliver(outcome.events, core.now())
        });
        if let Err(err) = delivered {
            tracing::error!(error = %err, "event dispatch failed");
        }
        if core.state().is_terminal() {
            break;
        }
    }

    commands.close();
    while let Some(command) = commands.recv().await {
        let DispatchCommand::Deliver(events) = command else {
            continue;
        };
        if let Err(err) = sink.deliver(events, core.now()) {
            tracing::error!(error = %err, "event dispatch failed");
        }
    }
    tracing::debug!("dispatcher stopped");
}

/// Sends frames the dispatcher owes the broker on their own task, so the
/// dispatcher keeps draining inbound frames while the transport is busy.
fn send_replies<T: Transport>(transport: &Arc<T>, replies: Vec<OutboundFrame>) {
    for reply in replies {
        let sender = Arc::clone(transport);
        tokio::spawn(async move {
            let name = reply.name();
            if let Err(err) = sender.send(reply).await {
                tracing::warn!(frame = name, error = %err, "failed to send reply frame");
            }
        });
    }
}

#[async_trait]
impl<T, C> QueueSession for Session<T, C>
where
    T: Transport,
    C: Clock + Send + Sync + 'static,
{
    fn state(&self) -> SessionState {
        self.shared.core.state()
    }

    async fn start(&self) -> SessionResult<()> {
        self.shared.core.begin_start()?;
        self.shared.connect().await
    }

    fn start_async(&self) -> SessionResult<()> {
        self.shared.core.begin_start()?;
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            if let Err(err) = shared.connect().await {
                tracing::warn!(error = %err, "asynchronous start failed");
                let event = shared
                    .core
                    .session_event(
                        SessionEventType::Error,
                        ResultCode::NotConnected,
                        CorrelationId::Unset,
                    )
                    .with_error_description(err.to_string());
                shared.dispatch(vec![Event::Session(event)]);
            }
        });
        Ok(())
    }

    async fn stop(&self) -> SessionResult<()> {
        match self.shared.core.begin_stop()? {
            StopProgress::Done => Ok(()),
            StopProgress::Proceed => self.shared.finish_stop().await,
        }
    }

    fn stop_async(&self) -> SessionResult<()> {
        if self.shared.core.begin_stop()? == StopProgress::Proceed {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                if let Err(err) = shared.finish_stop().await {
                    tracing::error!(error = %err, "asynchronous stop failed");
                }
            });
        }
        Ok(())
    }

    async fn open_queue_sync(&self, request: OpenQueueRequest) -> SessionResult<SessionEvent> {
        let (waiter, result) = oneshot::channel();
        let issued = self.shared.core.issue_open(&request, Some(waiter))?;
        let request_id = issued.request;
        self.shared.send_request(issued).await?;
        let timeout = self.shared.core.options().open_queue_timeout;
        self.shared.await_result(request_id, result, timeout).await
    }

    async fn open_queue(&self, request: OpenQueueRequest) -> SessionResult<CorrelationId> {
        let issued = self.shared.core.issue_open(&request, None)?;
        self.shared.send_request(issued).await
    }

    async fn configure_queue_sync(
        &self,
        request: ConfigureQueueRequest,
    ) -> SessionResult<SessionEvent> {
        let (waiter, result) = oneshot::channel();
        let issued = self.shared.core.issue_configure(&request, Some(waiter))?;
        let request_id = issued.request;
        self.shared.send_request(issued).await?;
        let timeout = self.shared.core.options().configure_queue_timeout;
        self.shared.await_result(request_id, result, timeout).await
    }

    async fn configure_queue(
        &self,
        request: ConfigureQueueRequest,
    ) -> SessionResult<CorrelationId> {
        let issued = self.shared.core.issue_configure(&request, None)?;
        self.shared.send_request(issued).await
    }

    async fn close_queue_sync(&self, request: CloseQueueRequest) -> SessionResult<SessionEvent> {
        let (waiter, result) = oneshot::channel();
        let issued = self.shared.core.issue_close(&request, Some(waiter))?;
        let request_id = issued.request;
        self.shared.send_request(issued).await?;
        let timeout = self.shared.core.options().close_queue_timeout;
        self.shared.await_result(request_id, result, timeout).await
    }

    async fn close_queue(&self, request: CloseQueueRequest) -> SessionResult<CorrelationId> {
        let issued = self.shared.core.issue_close(&request, None)?;
        self.shared.send_request(issued).await
    }

    async fn post(&self, event: &MessageEvent) -> SessionResult<()> {
        let frames = self.shared.core.issue_post(event)?;
        self.shared.send_all(frames).await
    }

    async fn confirm(&self, batch: &ConfirmBatch) -> SessionResult<()> {
        let frames = self.shared.core.issue_confirm(batch)?;
        self.shared.send_all(frames).await
    }

    async fn next_event(&self, timeout: Duration) -> SessionResult<Event> {
        let Some(queue) = self.shared.pull_queue.as_ref() else {
            return Err(SessionError::NotSupported(
                "next_event is unavailable when an event handler is registered",
            ));
        };
        let core = &self.shared.core;
        if core.state().is_terminal() && !self.shared.dispatcher_running() {
            return queue
                .try_pop(core.now())?
                .ok_or_else(|| SessionError::InvalidState {
                    operation: "wait for events",
                    state: core.state(),
                });
        }
        let next = queue.pop(timeout, || core.now()).await?;
        Ok(next.unwrap_or_else(|| {
            Event::Session(core.session_event(
                SessionEventType::Timeout,
                ResultCode::Timeout,
                CorrelationId::Unset,
            ))
        }))
    }

    fn create_message_event_builder(&self) -> MessageEventBuilder {
        MessageEventBuilder::with_max_payload_size(self.shared.core.options().max_payload_size)
    }
}
