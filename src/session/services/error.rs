//! Errors returned synchronously by session operations.

use crate::message::builder::BuilderError;
use crate::message::domain::{CorrelationId, MessageEventType};
use crate::queue::domain::{QueueDomainError, QueueState, QueueTransitionError};
use crate::session::domain::{OperationKind, SessionConfigError, SessionState};
use crate::session::ports::TransportError;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Failures detected before an operation reaches the broker, or while
/// waiting for its result.
///
/// Broker-side outcomes are not errors: they arrive as result codes on
/// events.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The session is not in a state that accepts the operation.
    #[error("cannot {operation} while the session is {state}")]
    InvalidState {
        /// Rejected operation.
        operation: &'static str,
        /// Current session state.
        state: SessionState,
    },

    /// Another transition is pending on the queue.
    #[error("a transition is already in progress on the queue (state: {state})")]
    AlreadyInProgress {
        /// Current queue state.
        state: QueueState,
    },

    /// The queue is already open.
    #[error("queue is already open")]
    AlreadyOpened,

    /// Another open queue of the session uses the same correlation id.
    #[error("correlation id {0} is already used by an open queue")]
    CorrelationIdNotUnique(CorrelationId),

    /// The queue is not open in this session.
    #[error("queue is not open (state: {state})")]
    QueueNotOpened {
        /// Current queue state.
        state: QueueState,
    },

    /// Queue address, flags or options were rejected.
    #[error(transparent)]
    Queue(#[from] QueueDomainError),

    /// Session options were rejected.
    #[error(transparent)]
    Config(#[from] SessionConfigError),

    /// A message or confirmation was rejected.
    #[error(transparent)]
    Builder(#[from] BuilderError),

    /// Only `Put` events can be posted.
    #[error("cannot post a {0} event")]
    NotPostable(MessageEventType),

    /// The operation is unavailable in this delivery mode.
    #[error("{0}")]
    NotSupported(&'static str),

    /// The transport rejected a frame.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The operation was abandoned before a result arrived.
    #[error("operation was cancelled")]
    Cancelled,

    /// No result arrived in time.
    #[error("operation timed out")]
    Timeout,

    /// A test harness tried to complete an operation that is not pending.
    #[error("no {0} operation is pending")]
    NoPendingOperation(OperationKind),

    /// Shared session state became unusable.
    #[error("internal session error: {0}")]
    Internal(String),
}

impl From<QueueTransitionError> for SessionError {
    fn from(err: QueueTransitionError) -> Self {
        match err {
            QueueTransitionError::AlreadyInProgress { state } => Self::AlreadyInProgress { state },
            QueueTransitionError::AlreadyOpened => Self::AlreadyOpened,
            QueueTransitionError::NotOpened { state } => Self::QueueNotOpened { state },
            QueueTransitionError::InvalidTransition { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl SessionError {
    /// Wraps a poisoned-lock or similar internal failure.
    #[must_use]
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }
}
