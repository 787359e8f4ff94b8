//! Tunable per-queue parameters.

use super::{QueueDomainError, QueueFlags, Subscription, SubscriptionHandle};
use crate::message::domain::{CodecSelection, CompressionAlgorithmType, EncodingType};
use serde::{Deserialize, Serialize};

/// Default cap on messages delivered but not yet confirmed.
pub const DEFAULT_MAX_UNCONFIRMED_MESSAGES: u64 = 1_000;

/// Default cap on bytes delivered but not yet confirmed.
pub const DEFAULT_MAX_UNCONFIRMED_BYTES: u64 = 33_554_432;

/// Snapshot of queue parameters passed to open and configure operations.
///
/// Subscriptions are kept in insertion order and are not part of the
/// serialised form: their handles only mean something inside one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    max_unconfirmed_messages: u64,
    max_unconfirmed_bytes: u64,
    consumer_priority: i32,
    suspends_on_bad_host_health: bool,
    encoding: EncodingType,
    compression: CompressionAlgorithmType,
    #[serde(skip)]
    subscriptions: Vec<(SubscriptionHandle, Subscription)>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_unconfirmed_messages: DEFAULT_MAX_UNCONFIRMED_MESSAGES,
            max_unconfirmed_bytes: DEFAULT_MAX_UNCONFIRMED_BYTES,
            consumer_priority: 0,
            suspends_on_bad_host_health: false,
            encoding: EncodingType::Raw,
            compression: CompressionAlgorithmType::None,
            subscriptions: Vec::new(),
        }
    }
}

impl QueueOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the unconfirmed message cap.
    #[must_use]
    pub const fn with_max_unconfirmed_messages(mut self, value: u64) -> Self {
        self.max_unconfirmed_messages = value;
        self
    }

    /// Sets the unconfirmed byte cap.
    #[must_use]
    pub const fn with_max_unconfirmed_bytes(mut self, value: u64) -> Self {
        self.max_unconfirmed_bytes = value;
        self
    }

    /// Sets the consumer priority.
    #[must_use]
    pub const fn with_consumer_priority(mut self, value: i32) -> Self {
        self.consumer_priority = value;
        self
    }

    /// Sets whether the queue suspends while the host is unhealthy.
    #[must_use]
    pub const fn with_suspends_on_bad_host_health(mut self, value: bool) -> Self {
        self.suspends_on_bad_host_health = value;
        self
    }

    /// Sets the default payload encoding for posts on this queue.
    #[must_use]
    pub const fn with_encoding(mut self, value: EncodingType) -> Self {
        self.encoding = value;
        self
    }

    /// Sets the default compression algorithm for posts on this queue.
    #[must_use]
    pub const fn with_compression(mut self, value: CompressionAlgorithmType) -> Self {
        self.compression = value;
        self
    }

    /// Adds a subscription, or replaces the one registered under the same
    /// handle in place.
    ///
    /// # Errors
    ///
    /// Returns [`QueueDomainError::InvalidSubscriptionExpression`] when the
    /// expression text does not match its version.
    pub fn add_or_update_subscription(
        &mut self,
        handle: SubscriptionHandle,
        subscription: Subscription,
    ) -> Result<(), QueueDomainError> {
        check_expression(&handle, &subscription)?;
        if let Some(entry) = self
            .subscriptions
            .iter_mut()
            .find(|(known, _)| *known == handle)
        {
            entry.1 = subscription;
        } else {
            self.subscriptions.push((handle, subscription));
        }
        Ok(())
    }

    /// Builder form of [`Self::add_or_update_subscription`].
    ///
    /// # Errors
    ///
    /// Returns [`QueueDomainError::InvalidSubscriptionExpression`] when the
    /// expression text does not match its version.
    pub fn with_subscription(
        mut self,
        handle: SubscriptionHandle,
        subscription: Subscription,
    ) -> Result<Self, QueueDomainError> {
        self.add_or_update_subscription(handle, subscription)?;
        Ok(self)
    }

    /// Removes the subscription registered under `handle`, returning
    /// whether one was present.
    pub fn remove_subscription(&mut self, handle: &SubscriptionHandle) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|(known, _)| known != handle);
        self.subscriptions.len() != before
    }

    /// Returns the subscription registered under `handle`.
    #[must_use]
    pub fn subscription(&self, handle: &SubscriptionHandle) -> Option<&Subscription> {
        self.subscriptions
            .iter()
            .find(|(known, _)| known == handle)
            .map(|(_, subscription)| subscription)
    }

    /// Iterates over the subscriptions in insertion order.
    pub fn subscriptions(&self) -> impl Iterator<Item = (&SubscriptionHandle, &Subscription)> {
        self.subscriptions
            .iter()
            .map(|(handle, subscription)| (handle, subscription))
    }

    /// Returns the unconfirmed message cap.
    #[must_use]
    pub const fn max_unconfirmed_messages(&self) -> u64 {
        self.max_unconfirmed_messages
    }

    /// Returns the unconfirmed byte cap.
    #[must_use]
    pub const fn max_unconfirmed_bytes(&self) -> u64 {
        self.max_unconfirmed_bytes
    }

    /// Returns the consumer priority.
    #[must_use]
    pub const fn consumer_priority(&self) -> i32 {
        self.consumer_priority
    }

    /// Returns whether the queue suspends while the host is unhealthy.
    #[must_use]
    pub const fn suspends_on_bad_host_health(&self) -> bool {
        self.suspends_on_bad_host_health
    }

    /// Returns the default codec applied to posts on this queue.
    #[must_use]
    pub const fn codec(&self) -> CodecSelection {
        CodecSelection::new(self.encoding, self.compression)
    }

    /// Checks the options against the flags the queue is opened with.
    ///
    /// # Errors
    ///
    /// Returns [`QueueDomainError::ZeroUnconfirmedLimit`] when a reader queue
    /// or one of its subscriptions allows no unconfirmed messages or bytes,
    /// [`QueueDomainError::SubscriptionsRequireRead`] when a queue that
    /// cannot read carries subscriptions, and
    /// [`QueueDomainError::InvalidCodec`] when the default codec cannot be
    /// used for posting on a writer queue.
    pub fn validate_for(&self, flags: QueueFlags) -> Result<(), QueueDomainError> {
        if flags.is_reader() {
            if self.max_unconfirmed_messages == 0 {
                return Err(QueueDomainError::ZeroUnconfirmedLimit("message"));
            }
            if self.max_unconfirmed_bytes == 0 {
                return Err(QueueDomainError::ZeroUnconfirmedLimit("byte"));
            }
            for (handle, subscription) in &self.subscriptions {
                check_expression(handle, subscription)?;
                if subscription.max_unconfirmed_messages() == Some(0) {
                    return Err(QueueDomainError::ZeroUnconfirmedLimit("subscription message"));
                }
                if subscription.max_unconfirmed_bytes() == Some(0) {
                    return Err(QueueDomainError::ZeroUnconfirmedLimit("subscription byte"));
                }
            }
        } else if !self.subscriptions.is_empty() {
            return Err(QueueDomainError::SubscriptionsRequireRead);
        }
        if flags.is_writer() {
            self.codec()
                .validate()
                .map_err(|err| QueueDomainError::InvalidCodec(err.to_string()))?;
        }
        Ok(())
    }
}

fn check_expression(
    handle: &SubscriptionHandle,
    subscription: &Subscription,
) -> Result<(), QueueDomainError> {
    let expression = subscription.expression();
    if expression.is_valid() {
        return Ok(());
    }
    Err(QueueDomainError::InvalidSubscriptionExpression {
        subscription: handle.id(),
        expression: expression.text().to_owned(),
    })
}
