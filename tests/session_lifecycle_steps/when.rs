//! When steps for session lifecycle BDD scenarios.

use super::world::{SessionWorld, run_async};
use eyre::WrapErr;
use mqsession::message::domain::{CorrelationId, PutMessage, ResultCode};
use mqsession::queue::domain::{QueueFlags, QueueId, Uri};
use mqsession::session::domain::{CloseQueueRequest, OpenQueueRequest};
use mqsession::session::services::QueueSession;
use rstest_bdd_macros::when;

#[when(
    r#"queue "{uri}" is opened for acknowledged writes with correlation id {correlation:i64}"#
)]
fn open_for_writes(
    world: &mut SessionWorld,
    uri: String,
    correlation: i64,
) -> Result<(), eyre::Report> {
    let queue = QueueId::auto();
    let request = OpenQueueRequest::new(
        &queue,
        Uri::parse(&uri)?,
        QueueFlags::WRITE | QueueFlags::ACK,
    )
    .with_correlation_id(CorrelationId::numeric(correlation));
    world.last_result = Some(run_async(world.session.open_queue_sync(request)));
    world.queue = Some(queue);
    Ok(())
}

#[when(r#"the message "{payload}" is posted"#)]
fn post_message(world: &mut SessionWorld, payload: String) -> Result<(), eyre::Report> {
    let queue = world.queue()?.clone();
    let correlation_id = run_async(
        world
            .session
            .post_message(&queue, PutMessage::new(payload)),
    )
    .wrap_err("post message")?;
    world.posted_correlation = Some(correlation_id);
    Ok(())
}

#[when("the broker acknowledges every post")]
fn acknowledge_posts(world: &mut SessionWorld) -> Result<(), eyre::Report> {
    world
        .session
        .acknowledge_all(ResultCode::Success)
        .wrap_err("acknowledge posts")?;
    Ok(())
}

#[when("the queue is closed with correlation id {correlation:i64}")]
fn close_queue(world: &mut SessionWorld, correlation: i64) -> Result<(), eyre::Report> {
    let request = CloseQueueRequest::new(world.queue()?)
        .with_correlation_id(CorrelationId::numeric(correlation));
    world.last_result = Some(run_async(world.session.close_queue_sync(request)));
    Ok(())
}

#[when("the session is stopped")]
fn stop_session(world: &mut SessionWorld) -> Result<(), eyre::Report> {
    run_async(world.session.stop()).wrap_err("stop session")?;
    Ok(())
}
