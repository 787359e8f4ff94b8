//! Results that arrive after their deadline.

use crate::in_memory::helpers::{broker, drain, open_queue, queue_uri, started_session_with};
use mqsession::message::domain::ResultCode;
use mqsession::queue::domain::{QueueFlags, QueueId, QueueState};
use mqsession::session::adapters::LoopbackBroker;
use mqsession::session::domain::{OpenQueueRequest, SessionOptions};
use mqsession::session::ports::OutboundFrame;
use mqsession::session::services::QueueSession;
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

const OPERATION_TIMEOUT: Duration = Duration::from_millis(200);

fn closes_of(broker: &LoopbackBroker, queue: &QueueId) -> eyre::Result<usize> {
    Ok(broker
        .sent_frames()?
        .iter()
        .filter(|frame| {
            matches!(frame, OutboundFrame::CloseQueue { queue: key, .. } if *key == queue.key())
        })
        .count())
}

async fn wait_for_close(broker: &LoopbackBroker, queue: &QueueId) -> eyre::Result<usize> {
    for _ in 0..200 {
        let closes = closes_of(broker, queue)?;
        if closes > 0 {
            return Ok(closes);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    closes_of(broker, queue)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn late_successful_open_is_closed_on_the_broker(
    broker: Arc<LoopbackBroker>,
) -> eyre::Result<()> {
    let options = SessionOptions::default().with_queue_operation_timeout(OPERATION_TIMEOUT);
    let session = started_session_with(&broker, options).await?;
    drain(&session).await;
    let queue = QueueId::auto();
    broker.hold_responses()?;

    let result = session
        .open_queue_sync(OpenQueueRequest::new(&queue, queue_uri()?, QueueFlags::READ))
        .await?;

    assert_eq!(result.status(), ResultCode::Timeout);
    assert_eq!(queue.state(), QueueState::Closed);
    assert_eq!(closes_of(&broker, &queue)?, 0);

    broker.release_responses().await?;

    assert_eq!(wait_for_close(&broker, &queue).await?, 1);
    assert_eq!(queue.state(), QueueState::Closed);
    assert_eq!(session.pending_operations()?, 0);

    open_queue(&session, &queue, QueueFlags::READ).await?;
    assert_eq!(queue.state(), QueueState::Opened);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn late_refused_open_sends_nothing(broker: Arc<LoopbackBroker>) -> eyre::Result<()> {
    let options = SessionOptions::default().with_queue_operation_timeout(OPERATION_TIMEOUT);
    let session = started_session_with(&broker, options).await?;
    drain(&session).await;
    let queue = QueueId::auto();
    broker.refuse_next_open(ResultCode::Refused)?;
    broker.hold_responses()?;

    let result = session
        .open_queue_sync(OpenQueueRequest::new(&queue, queue_uri()?, QueueFlags::READ))
        .await?;
    broker.release_responses().await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(result.status(), ResultCode::Timeout);
    assert_eq!(closes_of(&broker, &queue)?, 0);
    Ok(())
}
