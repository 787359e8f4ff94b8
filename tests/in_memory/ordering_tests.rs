//! Acknowledgement and delivery ordering.

use crate::in_memory::helpers::{broker, drain, message_events, open_queue, started_session};
use mqsession::message::domain::{CorrelationId, MessageEventType, PutMessage};
use mqsession::queue::domain::{QueueFlags, QueueId};
use mqsession::session::adapters::LoopbackBroker;
use mqsession::session::services::QueueSession;
use rstest::rstest;
use std::sync::Arc;

#[rstest]
#[case::single(1)]
#[case::several(5)]
#[case::many(64)]
#[tokio::test(flavor = "multi_thread")]
async fn acknowledgements_preserve_submission_order(
    broker: Arc<LoopbackBroker>,
    #[case] count: i64,
) -> eyre::Result<()> {
    let session = started_session(&broker).await?;
    let queue = QueueId::auto();
    open_queue(&session, &queue, QueueFlags::WRITE | QueueFlags::ACK).await?;
    drain(&session).await;

    let mut posted = Vec::new();
    for index in 0..count {
        posted.push(
            session
                .post_message(
                    &queue,
                    PutMessage::new(format!("message {index}"))
                        .with_correlation_id(CorrelationId::numeric(index)),
                )
                .await?,
        );
    }

    let events = drain(&session).await;
    let acknowledged: Vec<CorrelationId> = message_events(&events)
        .into_iter()
        .filter(|batch| batch.event_type() == MessageEventType::Ack)
        .flat_map(|batch| batch.messages().map(|ack| ack.correlation_id().clone()))
        .collect();
    assert_eq!(acknowledged, posted);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deliveries_preserve_submission_order(broker: Arc<LoopbackBroker>) -> eyre::Result<()> {
    let session = started_session(&broker).await?;
    let writer = QueueId::auto();
    let reader = QueueId::auto();
    open_queue(&session, &writer, QueueFlags::WRITE).await?;
    open_queue(&session, &reader, QueueFlags::READ).await?;
    drain(&session).await;

    let payloads: Vec<String> = (0..10).map(|index| format!("payload {index}")).collect();
    for payload in &payloads {
        session
            .post_message(&writer, PutMessage::new(payload.clone()))
            .await?;
    }

    let events = drain(&session).await;
    let delivered: Vec<String> = message_events(&events)
        .into_iter()
        .filter(|batch| batch.event_type() == MessageEventType::Push)
        .flat_map(|batch| {
            batch
                .messages()
                .map(|message| String::from_utf8_lossy(message.payload()).into_owned())
        })
        .collect();
    assert_eq!(delivered, payloads);
    Ok(())
}
