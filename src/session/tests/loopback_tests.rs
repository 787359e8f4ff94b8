//! Loopback broker behaviour, driven through the transport port directly.

use super::fixtures::queue_uri;
use crate::message::domain::{
    CodecSelection, CompressionAlgorithmType, CorrelationId, EncodingType, ResultCode,
};
use crate::queue::domain::{QueueFlags, QueueKey, QueueOptions};
use crate::session::adapters::LoopbackBroker;
use crate::session::domain::{BrokerEndpoint, RequestId};
use crate::session::ports::{InboundFrame, OutboundFrame, PutFrame, Transport, TransportError};
use rstest::{fixture, rstest};
use tokio::sync::mpsc;

const WRITER: QueueKey = QueueKey::from_raw(1);
const READER: QueueKey = QueueKey::from_raw(2);

#[fixture]
fn broker() -> LoopbackBroker {
    LoopbackBroker::new()
}

fn endpoint() -> BrokerEndpoint {
    BrokerEndpoint::parse("tcp://localhost:30114").expect("endpoint should parse")
}

fn open_frame(request: u64, queue: QueueKey, flags: QueueFlags) -> OutboundFrame {
    OutboundFrame::OpenQueue {
        request: RequestId::from_raw(request),
        queue,
        uri: queue_uri(),
        flags,
        options: QueueOptions::default(),
    }
}

fn put_frame(request: u64, ack_requested: bool) -> OutboundFrame {
    OutboundFrame::Put(PutFrame {
        request: RequestId::from_raw(request),
        queue: WRITER,
        payload: b"hello".to_vec(),
        codec: CodecSelection::new(EncodingType::Raw, CompressionAlgorithmType::None),
        correlation_id: CorrelationId::numeric(7),
        ack_requested,
    })
}

fn drain_frames(inbound: &mut mpsc::Receiver<InboundFrame>) -> Vec<InboundFrame> {
    let mut frames = Vec::new();
    while let Ok(frame) = inbound.try_recv() {
        frames.push(frame);
    }
    frames
}

async fn connected(broker: &LoopbackBroker) -> mpsc::Receiver<InboundFrame> {
    broker
        .connect(&endpoint())
        .await
        .expect("connect should succeed")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn open_is_answered_with_success(broker: LoopbackBroker) {
    let mut inbound = connected(&broker).await;

    broker
        .send(open_frame(1, WRITER, QueueFlags::WRITE))
        .await
        .expect("send should succeed");

    let frames = drain_frames(&mut inbound);
    assert!(matches!(
        frames.as_slice(),
        [InboundFrame::OpenQueueResponse(response)]
            if response.request == RequestId::from_raw(1) && response.status.is_success()
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn refused_open_carries_status_and_description(broker: LoopbackBroker) {
    let mut inbound = connected(&broker).await;
    broker
        .refuse_next_open(ResultCode::Refused)
        .expect("refusal should be queued");

    broker
        .send(open_frame(1, WRITER, QueueFlags::WRITE))
        .await
        .expect("send should succeed");

    let frames = drain_frames(&mut inbound);
    let [InboundFrame::OpenQueueResponse(response)] = frames.as_slice() else {
        panic!("expected one open response, got {frames:?}");
    };
    assert_eq!(response.status, ResultCode::Refused);
    assert_eq!(
        response.description.as_deref(),
        Some("open refused by broker")
    );
}

#[rstest]
#[case::acked(true, 1)]
#[case::unacked(false, 0)]
#[tokio::test(flavor = "multi_thread")]
async fn posts_are_acknowledged_only_on_request(
    broker: LoopbackBroker,
    #[case] ack_requested: bool,
    #[case] expected_acks: usize,
) {
    let mut inbound = connected(&broker).await;
    broker
        .send(open_frame(1, WRITER, QueueFlags::WRITE | QueueFlags::ACK))
        .await
        .expect("open should send");
    drain_frames(&mut inbound);

    broker
        .send(put_frame(2, ack_requested))
        .await
        .expect("put should send");

    let acks = drain_frames(&mut inbound)
        .into_iter()
        .filter(|frame| matches!(frame, InboundFrame::Ack { .. }))
        .count();
    assert_eq!(acks, expected_acks);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn posts_are_routed_to_readers_of_the_same_queue(broker: LoopbackBroker) {
    let mut inbound = connected(&broker).await;
    broker
        .send(open_frame(1, WRITER, QueueFlags::WRITE | QueueFlags::ACK))
        .await
        .expect("writer open should send");
    broker
        .send(open_frame(2, READER, QueueFlags::READ))
        .await
        .expect("reader open should send");
    drain_frames(&mut inbound);

    broker
        .send(put_frame(3, true))
        .await
        .expect("put should send");

    let frames = drain_frames(&mut inbound);
    let [
        InboundFrame::Ack {
            guid: acked,
            status,
            ..
        },
        InboundFrame::Push {
            queue,
            guid: pushed,
            payload,
            ..
        },
    ] = frames.as_slice()
    else {
        panic!("expected an ack then a push, got {frames:?}");
    };
    assert!(status.is_success());
    assert_eq!(acked, pushed);
    assert_eq!(*queue, READER);
    assert_eq!(payload.as_slice(), b"hello");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn closed_readers_stop_receiving(broker: LoopbackBroker) {
    let mut inbound = connected(&broker).await;
    broker
        .send(open_frame(1, WRITER, QueueFlags::WRITE))
        .await
        .expect("writer open should send");
    broker
        .send(open_frame(2, READER, QueueFlags::READ))
        .await
        .expect("reader open should send");
    broker
        .send(OutboundFrame::CloseQueue {
            request: RequestId::from_raw(3),
            queue: READER,
        })
        .await
        .expect("close should send");
    drain_frames(&mut inbound);

    broker
        .send(put_frame(4, false))
        .await
        .expect("put should send");

    assert!(drain_frames(&mut inbound).is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn held_responses_arrive_on_release(broker: LoopbackBroker) {
    let mut inbound = connected(&broker).await;
    broker.hold_responses().expect("hold should apply");

    broker
        .send(open_frame(1, WRITER, QueueFlags::WRITE))
        .await
        .expect("send should succeed");
    assert!(drain_frames(&mut inbound).is_empty());

    broker
        .release_responses()
        .await
        .expect("release should forward");
    assert_eq!(drain_frames(&mut inbound).len(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn transient_send_failure_keeps_the_connection(broker: LoopbackBroker) {
    let _inbound = connected(&broker).await;
    broker
        .fail_next_send(TransportError::transient("buffer full"))
        .expect("failure should be queued");

    let err = broker
        .send(open_frame(1, WRITER, QueueFlags::WRITE))
        .await
        .expect_err("send should fail");

    assert!(!err.is_fatal());
    assert!(broker.is_connected().expect("state should be readable"));
    assert!(broker.sent_frames().expect("state should be readable").is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn fatal_send_failure_drops_the_connection(broker: LoopbackBroker) {
    let mut inbound = connected(&broker).await;
    broker
        .fail_next_send(TransportError::fatal("socket reset"))
        .expect("failure should be queued");

    let err = broker
        .send(open_frame(1, WRITER, QueueFlags::WRITE))
        .await
        .expect_err("send should fail");

    assert!(err.is_fatal());
    assert!(!broker.is_connected().expect("state should be readable"));
    assert!(inbound.recv().await.is_none());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn dropped_connection_reports_the_reason(broker: LoopbackBroker) {
    let mut inbound = connected(&broker).await;

    broker
        .drop_connection("broker restarted")
        .await
        .expect("drop should forward");

    assert!(matches!(
        inbound.recv().await,
        Some(InboundFrame::ConnectionLost { reason }) if reason == "broker restarted"
    ));
    assert!(inbound.recv().await.is_none());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_connect_is_reported_once(broker: LoopbackBroker) {
    broker
        .fail_next_connect(TransportError::transient("connection refused"))
        .expect("failure should be queued");

    assert!(broker.connect(&endpoint()).await.is_err());
    assert!(broker.connect(&endpoint()).await.is_ok());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sending_without_a_connection_fails(broker: LoopbackBroker) {
    let err = broker
        .send(OutboundFrame::Disconnect)
        .await
        .expect_err("send should fail");

    assert!(err.is_fatal());
}
