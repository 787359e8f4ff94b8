//! Error types for queue addressing and option validation.

use super::QueueState;
use thiserror::Error;

/// Errors returned while constructing queue domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueDomainError {
    /// The URI does not follow `scheme://domain[~tier]/queue[?id=app]`.
    #[error("malformed queue URI '{uri}': {reason}")]
    MalformedUri {
        /// Rejected input.
        uri: String,
        /// Description of the syntax violation.
        reason: String,
    },

    /// The URI scheme is well-formed but not supported.
    #[error("unsupported URI scheme '{0}' (expected 'bmq')")]
    UnsupportedScheme(String),

    /// The URI names no queue.
    #[error("queue URI '{0}' has an empty queue name")]
    EmptyQueueName(String),

    /// The URI has a tier separator without a tier.
    #[error("queue URI '{0}' has an empty tier")]
    EmptyTier(String),

    /// The domain exceeds the length limit.
    #[error("domain '{domain}' exceeds {limit} characters")]
    DomainTooLong {
        /// Offending domain.
        domain: String,
        /// Maximum length.
        limit: usize,
    },

    /// The queue name exceeds the length limit.
    #[error("queue name '{queue}' exceeds {limit} characters")]
    QueueNameTooLong {
        /// Offending queue name.
        queue: String,
        /// Maximum length.
        limit: usize,
    },

    /// The query string carries a parameter other than `id`.
    #[error("unknown URI query parameter '{0}'")]
    UnknownQueryParameter(String),

    /// A flag name is not recognised.
    #[error("unknown queue flag '{0}'")]
    UnknownFlagName(String),

    /// The bitset contains bits that name no flag.
    #[error("queue flags contain unknown bits {0:#x}")]
    UnknownFlagBits(u64),

    /// Neither reading nor writing was requested.
    #[error("queue flags must include READ or WRITE")]
    MissingReadOrWrite,

    /// Acknowledgements were requested on a queue that cannot be written.
    #[error("ACK flag requires WRITE")]
    AckWithoutWrite,

    /// A reader queue allows zero unconfirmed messages or bytes.
    #[error("reader queue requires a non-zero {0} limit")]
    ZeroUnconfirmedLimit(&'static str),

    /// The default codec in the options cannot be used for posting.
    #[error("invalid default codec: {0}")]
    InvalidCodec(String),

    /// A subscription expression does not match its language version.
    #[error("subscription {subscription} has an invalid expression '{expression}'")]
    InvalidSubscriptionExpression {
        /// Id of the offending subscription.
        subscription: u32,
        /// Rejected expression text.
        expression: String,
    },

    /// Subscriptions were supplied for a queue that cannot read.
    #[error("subscriptions require the READ flag")]
    SubscriptionsRequireRead,
}

impl QueueDomainError {
    /// Returns whether the input was syntactically malformed, as opposed to
    /// well-formed but semantically invalid.
    #[must_use]
    pub const fn is_parse_error(&self) -> bool {
        matches!(self, Self::MalformedUri { .. } | Self::UnknownFlagName(_))
    }
}

/// Errors returned when a queue cannot enter the requested state.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum QueueTransitionError {
    /// Another open, configure or close is still pending on the queue.
    #[error("a queue transition is already in progress (state: {state})")]
    AlreadyInProgress {
        /// State the queue is currently in.
        state: QueueState,
    },

    /// The queue is already open.
    #[error("queue is already open")]
    AlreadyOpened,

    /// The operation requires an open queue.
    #[error("queue is not open (state: {state})")]
    NotOpened {
        /// State the queue is currently in.
        state: QueueState,
    },

    /// The state machine does not allow the transition.
    #[error("invalid queue transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: QueueState,
        /// Requested state.
        to: QueueState,
    },
}
