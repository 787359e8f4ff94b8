//! Given steps for session lifecycle BDD scenarios.

use super::world::{SessionWorld, run_async};
use eyre::WrapErr;
use mqsession::queue::domain::{QueueFlags, QueueId, Uri};
use mqsession::session::domain::OpenQueueRequest;
use mqsession::session::services::QueueSession;
use rstest_bdd_macros::given;

#[given("a started mock session")]
fn started_session(world: &mut SessionWorld) -> Result<(), eyre::Report> {
    run_async(world.session.start()).wrap_err("start mock session")?;
    Ok(())
}

#[given("a stopped mock session")]
fn stopped_session(world: &mut SessionWorld) -> Result<(), eyre::Report> {
    run_async(world.session.start()).wrap_err("start mock session")?;
    run_async(world.session.stop()).wrap_err("stop mock session")?;
    Ok(())
}

#[given(r#"an open of queue "{uri}" is pending"#)]
fn open_is_pending(world: &mut SessionWorld, uri: String) -> Result<(), eyre::Report> {
    let queue = QueueId::auto();
    let request = OpenQueueRequest::new(&queue, Uri::parse(&uri)?, QueueFlags::READ);
    let correlation_id =
        run_async(world.session.open_queue(request)).wrap_err("send asynchronous open")?;
    world.pending_correlation = Some(correlation_id);
    world.queue = Some(queue);
    Ok(())
}
