//! Open, post and close round trip on a writer queue.

use crate::in_memory::helpers::{
    LoopbackSession, broker, drain, message_events, queue_uri, started_session,
};
use mqsession::message::domain::{
    CorrelationId, MessageEventType, PutMessage, ResultCode, SessionEventType,
};
use mqsession::queue::domain::{QueueFlags, QueueId, QueueState};
use mqsession::session::adapters::LoopbackBroker;
use mqsession::session::domain::{CloseQueueRequest, OpenQueueRequest};
use mqsession::session::ports::OutboundFrame;
use mqsession::session::services::QueueSession;
use rstest::rstest;
use std::sync::Arc;

async fn open_with_correlation(
    session: &LoopbackSession,
    queue: &QueueId,
) -> eyre::Result<()> {
    let opened = session
        .open_queue_sync(
            OpenQueueRequest::new(queue, queue_uri()?, QueueFlags::WRITE | QueueFlags::ACK)
                .with_correlation_id(CorrelationId::numeric(7)),
        )
        .await?;

    assert_eq!(opened.event_type(), SessionEventType::QueueOpenResult);
    assert_eq!(opened.status(), ResultCode::Success);
    assert_eq!(opened.correlation_id(), &CorrelationId::numeric(7));
    assert_eq!(queue.state(), QueueState::Opened);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn open_post_close_round_trip(broker: Arc<LoopbackBroker>) -> eyre::Result<()> {
    let session = started_session(&broker).await?;
    drain(&session).await;
    let queue = QueueId::auto();
    open_with_correlation(&session, &queue).await?;

    let correlation_id = session
        .post_message(&queue, PutMessage::new("hello"))
        .await?;
    let events = drain(&session).await;
    let batches = message_events(&events);
    let [ack_event] = batches.as_slice() else {
        eyre::bail!("expected one acknowledgement batch, got {events:?}");
    };
    let acks: Vec<_> = ack_event.messages().collect();
    let [ack] = acks.as_slice() else {
        eyre::bail!("expected one acknowledgement, got {ack_event}");
    };
    assert_eq!(ack_event.event_type(), MessageEventType::Ack);
    assert!(correlation_id.is_auto_value());
    assert_eq!(ack.correlation_id(), &correlation_id);
    assert!(!ack.guid().is_unset());
    assert!(ack.is_valid());

    let closed = session
        .close_queue_sync(
            CloseQueueRequest::new(&queue).with_correlation_id(CorrelationId::numeric(8)),
        )
        .await?;

    assert_eq!(closed.event_type(), SessionEventType::QueueCloseResult);
    assert_eq!(closed.status(), ResultCode::Success);
    assert_eq!(closed.correlation_id(), &CorrelationId::numeric(8));
    assert_eq!(queue.state(), QueueState::Closed);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn posted_frame_carries_queue_payload_codec_and_correlation(
    broker: Arc<LoopbackBroker>,
) -> eyre::Result<()> {
    let session = started_session(&broker).await?;
    let queue = QueueId::auto();
    open_with_correlation(&session, &queue).await?;

    let correlation_id = session
        .post_message(
            &queue,
            PutMessage::new("hello").with_correlation_id(CorrelationId::numeric(42)),
        )
        .await?;

    let frames = broker.sent_frames()?;
    let Some(OutboundFrame::Put(put)) = frames.last() else {
        eyre::bail!("expected a put frame last, got {frames:?}");
    };
    assert_eq!(correlation_id, CorrelationId::numeric(42));
    assert_eq!(put.queue, queue.key());
    assert_eq!(put.payload.as_slice(), b"hello");
    assert_eq!(put.correlation_id, correlation_id);
    assert_eq!(put.codec, queue.options().unwrap_or_default().codec());
    assert!(put.ack_requested);
    Ok(())
}
