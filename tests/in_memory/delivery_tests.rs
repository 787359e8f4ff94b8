//! Decoding of delivered payloads.

use crate::in_memory::helpers::{
    broker, drain, message_events, open_queue, started_session, started_session_with,
};
use mqsession::message::codec::{COMPRESSION_THRESHOLD, encode_payload};
use mqsession::message::domain::{
    CodecSelection, CompressionAlgorithmType, EncodingType, Event, MessageEventType, MessageGuid,
    PutMessage, ResultCode, SessionEventType,
};
use mqsession::queue::domain::{QueueFlags, QueueId};
use mqsession::session::adapters::LoopbackBroker;
use mqsession::session::domain::SessionOptions;
use mqsession::session::ports::{InboundFrame, OutboundFrame};
use mqsession::session::services::QueueSession;
use rstest::rstest;
use std::sync::Arc;

const DELIVERY_LIMIT: usize = COMPRESSION_THRESHOLD * 64;

fn zlib() -> CodecSelection {
    CodecSelection::new(EncodingType::Raw, CompressionAlgorithmType::Zlib)
}

fn pushes(events: &[Event]) -> Vec<Vec<u8>> {
    message_events(events)
        .into_iter()
        .filter(|batch| batch.event_type() == MessageEventType::Push)
        .flat_map(|batch| batch.messages().map(|message| message.payload().to_vec()))
        .collect()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn compressed_post_reaches_readers_decoded(
    broker: Arc<LoopbackBroker>,
) -> eyre::Result<()> {
    let session = started_session(&broker).await?;
    let writer = QueueId::auto();
    let reader = QueueId::auto();
    open_queue(&session, &writer, QueueFlags::WRITE).await?;
    open_queue(&session, &reader, QueueFlags::READ).await?;
    drain(&session).await;
    let payload = vec![b'x'; COMPRESSION_THRESHOLD * 8];

    session
        .post_message(
            &writer,
            PutMessage::new(payload.clone()).with_compression(CompressionAlgorithmType::Zlib),
        )
        .await?;

    let sent = broker.sent_frames()?;
    let Some(OutboundFrame::Put(put)) = sent.last() else {
        eyre::bail!("expected a put frame, got {sent:?}");
    };
    assert_eq!(put.codec.compression, CompressionAlgorithmType::Zlib);
    assert!(put.payload.len() < payload.len());

    let events = drain(&session).await;
    let batches = message_events(&events);
    let [delivered] = batches.as_slice() else {
        eyre::bail!("expected one push batch, got {events:?}");
    };
    let messages: Vec<_> = delivered.messages().collect();
    let [message] = messages.as_slice() else {
        eyre::bail!("expected one delivered message, got {delivered}");
    };
    assert_eq!(delivered.event_type(), MessageEventType::Push);
    assert_eq!(message.queue(), Some(&reader));
    assert_eq!(message.payload(), payload.as_slice());
    assert_eq!(message.compression(), CompressionAlgorithmType::Zlib);
    assert!(message.is_valid());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn push_inflating_past_the_limit_is_reported_not_delivered(
    broker: Arc<LoopbackBroker>,
) -> eyre::Result<()> {
    let options = SessionOptions::default().with_max_payload_size(DELIVERY_LIMIT);
    let session = started_session_with(&broker, options).await?;
    let reader = QueueId::auto();
    open_queue(&session, &reader, QueueFlags::READ).await?;
    drain(&session).await;
    let oversized = encode_payload(vec![0; DELIVERY_LIMIT + 1], zlib())?;
    let fitting = encode_payload(vec![1; DELIVERY_LIMIT], zlib())?;
    assert!(oversized.bytes.len() < COMPRESSION_THRESHOLD);

    for encoded in [oversized, fitting] {
        broker
            .inject(InboundFrame::Push {
                queue: reader.key(),
                guid: MessageGuid::new_random(),
                payload: encoded.bytes,
                codec: encoded.codec,
            })
            .await?;
    }

    let events = drain(&session).await;
    let errors: Vec<_> = events
        .iter()
        .filter_map(Event::as_session_event)
        .filter(|notice| notice.event_type() == SessionEventType::Error)
        .collect();
    let [error] = errors.as_slice() else {
        eyre::bail!("expected one error event, got {events:?}");
    };
    assert_eq!(error.status(), ResultCode::InvalidArgument);
    assert_eq!(error.queue(), Some(&reader));
    assert!(
        error
            .error_description()
            .is_some_and(|text| text.contains("exceeds"))
    );
    assert_eq!(pushes(&events), vec![vec![1_u8; DELIVERY_LIMIT]]);
    Ok(())
}
