//! Then steps for session lifecycle BDD scenarios.

use super::world::{SessionWorld, run_async};
use mqsession::message::domain::{CorrelationId, Event, MessageEventType, SessionEventType};
use mqsession::session::domain::SessionState;
use mqsession::session::services::{QueueSession, SessionError};
use rstest_bdd_macros::then;
use std::time::Duration;

const EVENT_WAIT: Duration = Duration::from_millis(50);

/// Moves every queued event into the world.
fn collect_events(world: &mut SessionWorld) -> Result<(), eyre::Report> {
    while let Ok(event) = run_async(world.session.next_event(EVENT_WAIT)) {
        if event
            .as_session_event()
            .is_some_and(|notice| notice.event_type() == SessionEventType::Timeout)
        {
            break;
        }
        world.events.push(event);
    }
    if world.events.is_empty() {
        return Err(eyre::eyre!("no events were delivered"));
    }
    Ok(())
}

#[then(r#"the queue result is "{status}" with correlation id {correlation:i64}"#)]
fn queue_result_is(
    world: &SessionWorld,
    status: String,
    correlation: i64,
) -> Result<(), eyre::Report> {
    let result = world
        .last_result
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing queue operation result"))?;
    let event = result
        .as_ref()
        .map_err(|err| eyre::eyre!("queue operation failed: {err}"))?;

    if event.status().to_string() != status {
        return Err(eyre::eyre!("expected status {status}, got {event}"));
    }
    if event.correlation_id() != &CorrelationId::numeric(correlation) {
        return Err(eyre::eyre!(
            "expected correlation id {correlation}, got {}",
            event.correlation_id()
        ));
    }
    Ok(())
}

#[then("one valid acknowledgement carries the posted correlation id")]
fn acknowledgement_matches(world: &mut SessionWorld) -> Result<(), eyre::Report> {
    collect_events(world)?;
    let posted = world
        .posted_correlation
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing posted correlation id"))?;
    let acks: Vec<_> = world
        .events
        .iter()
        .filter_map(Event::as_message_event)
        .filter(|batch| batch.event_type() == MessageEventType::Ack)
        .flat_map(|batch| batch.messages())
        .collect();

    let [ack] = acks.as_slice() else {
        return Err(eyre::eyre!("expected one acknowledgement, got {}", acks.len()));
    };
    if ack.correlation_id() != posted || !posted.is_auto_value() {
        return Err(eyre::eyre!(
            "acknowledgement carries {}, expected auto id {posted}",
            ack.correlation_id()
        ));
    }
    if !ack.is_valid() || ack.guid().is_unset() {
        return Err(eyre::eyre!("acknowledgement is not a valid message"));
    }
    Ok(())
}

#[then(r#"the pending open is reported as "{status}""#)]
fn pending_open_reported(world: &mut SessionWorld, status: String) -> Result<(), eyre::Report> {
    collect_events(world)?;
    let expected = world
        .pending_correlation
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing pending correlation id"))?;
    let resolved = world
        .events
        .iter()
        .filter_map(Event::as_session_event)
        .find(|notice| notice.event_type() == SessionEventType::QueueOpenResult)
        .ok_or_else(|| eyre::eyre!("no open result among {:?}", world.events))?;

    if resolved.status().to_string() != status || resolved.correlation_id() != expected {
        return Err(eyre::eyre!("unexpected open result {resolved}"));
    }
    if world.session.state() != SessionState::Stopped {
        return Err(eyre::eyre!("session is {}", world.session.state()));
    }
    Ok(())
}

#[then(r#"the last event is "{event_type}""#)]
fn last_event_is(world: &SessionWorld, event_type: String) -> Result<(), eyre::Report> {
    let last = world
        .events
        .last()
        .ok_or_else(|| eyre::eyre!("no events were collected"))?;
    let found = last
        .as_session_event()
        .map(|notice| notice.event_type().to_string());
    if found.as_deref() != Some(event_type.as_str()) {
        return Err(eyre::eyre!("expected {event_type} last, got {last}"));
    }
    Ok(())
}

#[then("the operation fails because the session is stopped")]
fn operation_fails_stopped(world: &SessionWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_result
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing queue operation result"))?;

    if !matches!(
        result,
        Err(SessionError::InvalidState {
            state: SessionState::Stopped,
            ..
        })
    ) {
        return Err(eyre::eyre!("expected an invalid state error, got {result:?}"));
    }
    Ok(())
}
