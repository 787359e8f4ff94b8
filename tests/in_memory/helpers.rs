//! Shared helpers for session integration tests.

use mqsession::message::domain::{Event, MessageEvent, ResultCode, SessionEvent, SessionEventType};
use mqsession::queue::domain::{QueueFlags, QueueId, Uri};
use mqsession::session::adapters::LoopbackBroker;
use mqsession::session::domain::{OpenQueueRequest, SessionOptions};
use mqsession::session::services::{QueueSession, Session};
use rstest::fixture;
use std::sync::Arc;
use std::time::Duration;

/// Queue used throughout the integration tests.
pub const QUEUE_URI: &str = "bmq://my.domain/queue1";

/// Session type driven by the loopback broker.
pub type LoopbackSession = Session<LoopbackBroker>;

/// Provides a fresh loopback broker for each test.
#[fixture]
pub fn broker() -> Arc<LoopbackBroker> {
    Arc::new(LoopbackBroker::new())
}

/// Parses [`QUEUE_URI`].
///
/// # Errors
///
/// Returns an error if the address does not parse.
pub fn queue_uri() -> eyre::Result<Uri> {
    Ok(Uri::parse(QUEUE_URI)?)
}

/// Builds and starts a session over `broker`.
///
/// # Errors
///
/// Returns an error if the session cannot be created or started.
pub async fn started_session(broker: &Arc<LoopbackBroker>) -> eyre::Result<LoopbackSession> {
    started_session_with(broker, SessionOptions::default()).await
}

/// Builds and starts a session over `broker` with explicit options.
///
/// # Errors
///
/// Returns an error if the options are invalid or the session cannot start.
pub async fn started_session_with(
    broker: &Arc<LoopbackBroker>,
    options: SessionOptions,
) -> eyre::Result<LoopbackSession> {
    let session = Session::new(Arc::clone(broker), options)?;
    session.start().await?;
    Ok(session)
}

/// Opens `queue` with `flags` and checks the broker accepted it.
///
/// # Errors
///
/// Returns an error if the open is rejected or unsuccessful.
pub async fn open_queue(
    session: &impl QueueSession,
    queue: &QueueId,
    flags: QueueFlags,
) -> eyre::Result<SessionEvent> {
    let result = session
        .open_queue_sync(OpenQueueRequest::new(queue, queue_uri()?, flags))
        .await?;
    eyre::ensure!(
        result.status() == ResultCode::Success,
        "open failed: {result}"
    );
    Ok(result)
}

/// Reads events until a wait times out or the session refuses to wait.
pub async fn drain(session: &impl QueueSession) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = session.next_event(Duration::from_millis(50)).await {
        if event
            .as_session_event()
            .is_some_and(|notice| notice.event_type() == SessionEventType::Timeout)
        {
            break;
        }
        events.push(event);
    }
    events
}

/// Returns the message batches among `events`.
#[must_use]
pub fn message_events(events: &[Event]) -> Vec<&MessageEvent> {
    events.iter().filter_map(Event::as_message_event).collect()
}
