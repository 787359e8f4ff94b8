//! Event delivery front-ends: a pull queue drained by `next_event`, or a
//! registered handler.

use super::{SessionError, SessionResult};
use crate::message::domain::{CorrelationId, Event, ResultCode, SessionEvent, SessionEventType};
use crate::session::ports::EventHandler;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<Event>,
    above_high_watermark: bool,
}

/// FIFO of events awaiting the application, with slow-consumer signalling.
///
/// Crossing the high watermark enqueues one `SlowConsumerHighWatermark`
/// event; draining back to the low watermark enqueues one
/// `SlowConsumerNormal` event.
#[derive(Debug)]
pub(crate) struct EventQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    low_watermark: usize,
    high_watermark: usize,
}

impl EventQueue {
    pub(crate) fn new(low_watermark: usize, high_watermark: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            low_watermark,
            high_watermark,
        }
    }

    pub(crate) fn push(&self, event: Event, now: DateTime<Utc>) -> SessionResult<()> {
        let mut state = self.state.lock().map_err(SessionError::internal)?;
        state.events.push_back(event);
        if !state.above_high_watermark && state.events.len() > self.high_watermark {
            state.above_high_watermark = true;
            tracing::warn!(
                depth = state.events.len(),
                high_watermark = self.high_watermark,
                "event queue above high watermark"
            );
            state
                .events
                .push_back(watermark_event(SessionEventType::SlowConsumerHighWatermark, now));
        }
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    pub(crate) fn try_pop(&self, now: DateTime<Utc>) -> SessionResult<Option<Event>> {
        let mut state = self.state.lock().map_err(SessionError::internal)?;
        let event = state.events.pop_front();
        if event.is_some()
            && state.above_high_watermark
            && state.events.len() <= self.low_watermark
        {
            state.above_high_watermark = false;
            tracing::info!(
                depth = state.events.len(),
                low_watermark = self.low_watermark,
                "event queue back to low watermark"
            );
            state
                .events
                .push_back(watermark_event(SessionEventType::SlowConsumerNormal, now));
        }
        Ok(event)
    }

    /// Waits up to `timeout` for an event.
    pub(crate) async fn pop(
        &self,
        timeout: Duration,
        now: impl Fn() -> DateTime<Utc> + Send + Sync,
    ) -> SessionResult<Option<Event>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(event) = self.try_pop(now())? {
                return Ok(Some(event));
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return self.try_pop(now());
            }
        }
    }

    pub(crate) fn snapshot(&self) -> SessionResult<Vec<Event>> {
        let state = self.state.lock().map_err(SessionError::internal)?;
        Ok(state.events.iter().cloned().collect())
    }

    pub(crate) fn len(&self) -> SessionResult<usize> {
        let state = self.state.lock().map_err(SessionError::internal)?;
        Ok(state.events.len())
    }
}

fn watermark_event(event_type: SessionEventType, now: DateTime<Utc>) -> Event {
    Event::Session(SessionEvent::new(
        event_type,
        ResultCode::Success,
        CorrelationId::Unset,
        now,
    ))
}

/// Where the dispatcher hands events.
#[derive(Clone)]
pub(crate) enum EventSink {
    Queue(Arc<EventQueue>),
    Handler(Arc<dyn EventHandler>),
}

impl EventSink {
    pub(crate) fn deliver(&self, events: Vec<Event>, now: DateTime<Utc>) -> SessionResult<()> {
        match self {
            Self::Queue(queue) => {
                for event in events {
                    queue.push(event, now)?;
                }
                Ok(())
            }
            Self::Handler(handler) => {
                for event in events {
                    invoke(handler.as_ref(), &event);
                }
                Ok(())
            }
        }
    }
}

pub(crate) fn invoke(handler: &dyn EventHandler, event: &Event) {
    match event {
        Event::Session(session_event) => handler.on_session_event(session_event),
        Event::Message(message_event) => handler.on_message_event(message_event),
    }
}
