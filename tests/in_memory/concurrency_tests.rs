//! Concurrent queue transitions.

use crate::in_memory::helpers::{broker, queue_uri, started_session};
use mqsession::message::domain::{CorrelationId, ResultCode};
use mqsession::queue::domain::{QueueFlags, QueueId, QueueState};
use mqsession::session::adapters::LoopbackBroker;
use mqsession::session::domain::OpenQueueRequest;
use mqsession::session::services::{QueueSession, SessionError};
use rstest::rstest;
use std::sync::Arc;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_opens_on_distinct_queues_both_complete(
    broker: Arc<LoopbackBroker>,
) -> eyre::Result<()> {
    let session = started_session(&broker).await?;
    let first = QueueId::new(CorrelationId::numeric(1));
    let second = QueueId::new(CorrelationId::numeric(2));
    let uri = queue_uri()?;

    let (first_result, second_result) = tokio::join!(
        session.open_queue_sync(OpenQueueRequest::new(&first, uri.clone(), QueueFlags::READ)),
        session.open_queue_sync(OpenQueueRequest::new(&second, uri, QueueFlags::WRITE)),
    );

    assert_eq!(first_result?.status(), ResultCode::Success);
    assert_eq!(second_result?.status(), ResultCode::Success);
    assert_eq!(first.state(), QueueState::Opened);
    assert_eq!(second.state(), QueueState::Opened);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn second_open_on_a_pending_queue_is_rejected(
    broker: Arc<LoopbackBroker>,
) -> eyre::Result<()> {
    let session = started_session(&broker).await?;
    let queue = QueueId::auto();
    broker.hold_responses()?;

    session
        .open_queue(OpenQueueRequest::new(&queue, queue_uri()?, QueueFlags::READ))
        .await?;
    let duplicate = session
        .open_queue(OpenQueueRequest::new(&queue, queue_uri()?, QueueFlags::READ))
        .await;

    assert_eq!(
        duplicate.err(),
        Some(SessionError::AlreadyInProgress {
            state: QueueState::Opening,
        })
    );
    assert_eq!(session.pending_operations()?, 1);
    Ok(())
}
