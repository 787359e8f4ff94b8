//! Domain model for queue addressing.
//!
//! Addresses, capability flags, options and subscriptions are validated
//! value types. A [`QueueId`] is the only stateful type here: it carries the
//! per-queue lifecycle that sessions drive.

mod error;
mod flags;
mod options;
mod queue_id;
mod subscription;
mod uri;

pub use error::{QueueDomainError, QueueTransitionError};
pub use flags::QueueFlags;
pub use options::{DEFAULT_MAX_UNCONFIRMED_BYTES, DEFAULT_MAX_UNCONFIRMED_MESSAGES, QueueOptions};
pub use queue_id::{QueueBinding, QueueId, QueueKey, QueueState};
pub use subscription::{
    ExpressionVersion, Subscription, SubscriptionExpression, SubscriptionHandle,
};
pub use uri::{MAX_DOMAIN_LENGTH, MAX_QUEUE_NAME_LENGTH, Uri, UriBuilder, UriKey};
