//! Consumer subscriptions carried in reader queue options.
//!
//! A subscription narrows what a reader receives with a broker-evaluated
//! expression and may override the queue's flow-control parameters. Its
//! handle identifies it across configure calls.

use crate::message::domain::CorrelationId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};

/// Process-wide source of subscription ids. Zero is never handed out.
static NEXT_SUBSCRIPTION_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies one subscription and the correlation reported with it.
///
/// Handles compare by id only: updating a subscription means passing the
/// same handle again.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: u32,
    correlation_id: CorrelationId,
}

impl SubscriptionHandle {
    /// Creates a handle with a fresh id.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            id: NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed),
            correlation_id,
        }
    }

    /// Returns the unique id of the subscription.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Returns the correlation id supplied at creation.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }
}

impl Default for SubscriptionHandle {
    fn default() -> Self {
        Self::new(CorrelationId::Unset)
    }
}

impl PartialEq for SubscriptionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SubscriptionHandle {}

impl Hash for SubscriptionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "subscription {} ({})", self.id, self.correlation_id)
    }
}

/// Language version of a subscription expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionVersion {
    /// No expression: every message matches.
    #[default]
    Undefined,
    /// First expression grammar.
    Version1,
}

/// Filter the broker evaluates against message properties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SubscriptionExpression {
    text: String,
    version: ExpressionVersion,
}

impl SubscriptionExpression {
    /// Creates an expression in the given language version.
    #[must_use]
    pub fn new(text: impl Into<String>, version: ExpressionVersion) -> Self {
        Self {
            text: text.into(),
            version,
        }
    }

    /// Returns the expression text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the language version.
    #[must_use]
    pub const fn version(&self) -> ExpressionVersion {
        self.version
    }

    /// Returns whether text and version agree: an undefined expression has
    /// no text and a versioned one has some.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self.version {
            ExpressionVersion::Undefined => self.text.is_empty(),
            ExpressionVersion::Version1 => !self.text.trim().is_empty(),
        }
    }
}

/// Parameters of one subscription.
///
/// Unset flow-control values inherit the queue's.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Subscription {
    max_unconfirmed_messages: Option<u64>,
    max_unconfirmed_bytes: Option<u64>,
    consumer_priority: Option<i32>,
    expression: SubscriptionExpression,
}

impl Subscription {
    /// Creates a subscription matching every message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expression selecting delivered messages.
    #[must_use]
    pub fn with_expression(mut self, expression: SubscriptionExpression) -> Self {
        self.expression = expression;
        self
    }

    /// Overrides the unconfirmed message cap.
    #[must_use]
    pub const fn with_max_unconfirmed_messages(mut self, value: u64) -> Self {
        self.max_unconfirmed_messages = Some(value);
        self
    }

    /// Overrides the unconfirmed byte cap.
    #[must_use]
    pub const fn with_max_unconfirmed_bytes(mut self, value: u64) -> Self {
        self.max_unconfirmed_bytes = Some(value);
        self
    }

    /// Overrides the consumer priority.
    #[must_use]
    pub const fn with_consumer_priority(mut self, value: i32) -> Self {
        self.consumer_priority = Some(value);
        self
    }

    /// Returns the expression selecting delivered messages.
    #[must_use]
    pub const fn expression(&self) -> &SubscriptionExpression {
        &self.expression
    }

    /// Returns the unconfirmed message cap override.
    #[must_use]
    pub const fn max_unconfirmed_messages(&self) -> Option<u64> {
        self.max_unconfirmed_messages
    }

    /// Returns the unconfirmed byte cap override.
    #[must_use]
    pub const fn max_unconfirmed_bytes(&self) -> Option<u64> {
        self.max_unconfirmed_bytes
    }

    /// Returns the consumer priority override.
    #[must_use]
    pub const fn consumer_priority(&self) -> Option<i32> {
        self.consumer_priority
    }
}
