//! Shared world state for session lifecycle BDD scenarios.

use mqsession::message::domain::{CorrelationId, Event, SessionEvent};
use mqsession::queue::domain::QueueId;
use mqsession::session::services::{MockSession, SessionError};
use rstest::fixture;

/// Scenario world for session lifecycle behaviour tests.
pub struct SessionWorld {
    pub session: MockSession,
    pub queue: Option<QueueId>,
    pub pending_correlation: Option<CorrelationId>,
    pub posted_correlation: Option<CorrelationId>,
    pub last_result: Option<Result<SessionEvent, SessionError>>,
    pub events: Vec<Event>,
}

impl SessionWorld {
    /// Creates a world around an unstarted mock session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: MockSession::new(),
            queue: None,
            pending_correlation: None,
            posted_correlation: None,
            last_result: None,
            events: Vec::new(),
        }
    }

    /// Returns the queue opened by an earlier step.
    ///
    /// # Errors
    ///
    /// Returns an error if no queue has been opened yet.
    pub fn queue(&self) -> Result<&QueueId, eyre::Report> {
        self.queue
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing queue in scenario world"))
    }
}

impl Default for SessionWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> SessionWorld {
    SessionWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
