//! Start, stop and terminal session states.

use crate::in_memory::helpers::{broker, drain, open_queue, queue_uri, started_session};
use mqsession::message::domain::{PutMessage, ResultCode, SessionEventType};
use mqsession::queue::domain::{QueueFlags, QueueId, QueueState};
use mqsession::session::adapters::LoopbackBroker;
use mqsession::session::domain::{CloseQueueRequest, OpenQueueRequest, SessionState};
use mqsession::session::services::{QueueSession, SessionError};
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const PROMPT: Duration = Duration::from_millis(500);

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stopped_session_rejects_operations_without_blocking(
    broker: Arc<LoopbackBroker>,
) -> eyre::Result<()> {
    let session = started_session(&broker).await?;
    let queue = QueueId::auto();
    open_queue(&session, &queue, QueueFlags::WRITE).await?;
    session.stop().await?;

    let open = timeout(
        PROMPT,
        session.open_queue_sync(OpenQueueRequest::new(
            &QueueId::auto(),
            queue_uri()?,
            QueueFlags::READ,
        )),
    )
    .await?;
    let close = timeout(PROMPT, session.close_queue_sync(CloseQueueRequest::new(&queue))).await?;
    let post = timeout(PROMPT, session.post_message(&queue, PutMessage::new("late"))).await?;

    assert!(matches!(
        open,
        Err(SessionError::InvalidState {
            state: SessionState::Stopped,
            ..
        })
    ));
    assert!(matches!(close, Err(SessionError::InvalidState { .. })));
    assert!(post.is_err());
    assert_eq!(queue.state(), QueueState::Closed);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stop_cancels_a_pending_open_before_returning(
    broker: Arc<LoopbackBroker>,
) -> eyre::Result<()> {
    let session = started_session(&broker).await?;
    drain(&session).await;
    let queue = QueueId::auto();
    broker.hold_responses()?;
    let correlation_id = session
        .open_queue(OpenQueueRequest::new(&queue, queue_uri()?, QueueFlags::READ))
        .await?;

    session.stop().await?;

    let events = drain(&session).await;
    let notices: Vec<_> = events
        .iter()
        .filter_map(|event| event.as_session_event())
        .collect();
    let [cancelled, disconnected] = notices.as_slice() else {
        eyre::bail!("expected a cancelled open then a disconnect, got {events:?}");
    };
    assert_eq!(cancelled.event_type(), SessionEventType::QueueOpenResult);
    assert_eq!(cancelled.status(), ResultCode::Cancelled);
    assert_eq!(cancelled.correlation_id(), &correlation_id);
    assert_eq!(disconnected.event_type(), SessionEventType::Disconnected);
    assert_eq!(queue.state(), QueueState::Closed);
    assert_eq!(session.pending_operations()?, 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn lost_connection_leaves_the_session_errored(
    broker: Arc<LoopbackBroker>,
) -> eyre::Result<()> {
    let session = started_session(&broker).await?;
    let queue = QueueId::auto();
    open_queue(&session, &queue, QueueFlags::WRITE).await?;

    broker.drop_connection("broker restarted").await?;
    let events = drain(&session).await;

    assert!(events.iter().any(|event| {
        event
            .as_session_event()
            .is_some_and(|notice| notice.event_type() == SessionEventType::ConnectionLost)
    }));
    assert_eq!(session.state(), SessionState::Errored);
    assert!(!queue.is_valid());
    assert!(matches!(
        session.start().await,
        Err(SessionError::InvalidState {
            state: SessionState::Errored,
            ..
        })
    ));
    Ok(())
}
