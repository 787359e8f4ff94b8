//! Session-scoped queue handles and their per-queue state machine.

use super::{QueueFlags, QueueOptions, QueueTransitionError, Uri};
use crate::message::domain::CorrelationId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static NEXT_QUEUE_KEY: AtomicU64 = AtomicU64::new(1);

/// Numeric key naming a queue handle on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueKey(u64);

impl QueueKey {
    fn next() -> Self {
        Self(NEXT_QUEUE_KEY.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a raw key value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw key value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Lifecycle state of one queue within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// The queue is not open.
    #[default]
    Closed,
    /// An open request is pending.
    Opening,
    /// The queue is open.
    Opened,
    /// A configure request is pending on an open queue.
    Configuring,
    /// A close request is pending.
    Closing,
}

impl QueueState {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Opened => "opened",
            Self::Configuring => "configuring",
            Self::Closing => "closing",
        }
    }

    /// Returns whether a transition is pending.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Opening | Self::Configuring | Self::Closing)
    }

    /// Returns whether the broker considers the queue open.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Opened | Self::Configuring | Self::Closing)
    }

    /// Returns whether messages may be posted or confirmed.
    #[must_use]
    pub const fn accepts_messages(self) -> bool {
        matches!(self, Self::Opened | Self::Configuring)
    }

    /// Returns whether transition to `target` is allowed.
    ///
    /// Every state may fall back to `Closed` so that a stopping session can
    /// release its queues regardless of pending work.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Closed, Self::Opening)
                | (Self::Opening, Self::Opened | Self::Closed)
                | (Self::Opened, Self::Configuring | Self::Closing | Self::Closed)
                | (Self::Configuring | Self::Closing, Self::Opened | Self::Closed)
        )
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Address and parameters a queue was opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    uri: Uri,
    flags: QueueFlags,
    options: QueueOptions,
}

impl QueueBinding {
    /// Creates a binding.
    #[must_use]
    pub const fn new(uri: Uri, flags: QueueFlags, options: QueueOptions) -> Self {
        Self {
            uri,
            flags,
            options,
        }
    }

    /// Returns the queue address.
    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the capability flags.
    #[must_use]
    pub const fn flags(&self) -> QueueFlags {
        self.flags
    }

    /// Returns the queue options currently in force.
    #[must_use]
    pub const fn options(&self) -> &QueueOptions {
        &self.options
    }
}

#[derive(Debug, Default)]
struct QueueSlot {
    state: QueueState,
    binding: Option<QueueBinding>,
    staged_options: Option<QueueOptions>,
}

impl QueueSlot {
    fn transition_to(&mut self, target: QueueState) -> Result<(), QueueTransitionError> {
        if !self.state.can_transition_to(target) {
            return Err(QueueTransitionError::InvalidTransition {
                from: self.state,
                to: target,
            });
        }
        self.state = target;
        Ok(())
    }

    const fn pending_or(&self, fallback: QueueTransitionError) -> QueueTransitionError {
        if self.state.is_pending() {
            QueueTransitionError::AlreadyInProgress { state: self.state }
        } else {
            fallback
        }
    }
}

#[derive(Debug)]
struct QueueInner {
    key: QueueKey,
    correlation_id: CorrelationId,
    slot: Mutex<QueueSlot>,
}

/// Handle naming one queue of a session.
///
/// Clones share state and compare equal. Two handles created separately are
/// different queues even when built from the same correlation id. The handle
/// is bound to an address when an open is issued and reports
/// [`QueueId::is_valid`] only while the queue is open.
#[derive(Debug, Clone)]
pub struct QueueId {
    inner: Arc<QueueInner>,
}

impl QueueId {
    /// Creates an unbound handle identified by `correlation_id`.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                key: QueueKey::next(),
                correlation_id: correlation_id.or_auto(),
                slot: Mutex::new(QueueSlot::default()),
            }),
        }
    }

    /// Creates an unbound handle with an auto-assigned correlation id.
    #[must_use]
    pub fn auto() -> Self {
        Self::new(CorrelationId::auto())
    }

    /// Returns the wire key of this handle.
    #[must_use]
    pub fn key(&self) -> QueueKey {
        self.inner.key
    }

    /// Returns the correlation id identifying this queue.
    #[must_use]
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.inner.correlation_id
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> QueueState {
        self.slot().state
    }

    /// Returns whether the queue is open.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state().is_open()
    }

    /// Returns the bound address, if an open was ever issued.
    #[must_use]
    pub fn uri(&self) -> Option<Uri> {
        self.slot().binding.as_ref().map(|binding| binding.uri.clone())
    }

    /// Returns the bound flags, if an open was ever issued.
    #[must_use]
    pub fn flags(&self) -> Option<QueueFlags> {
        self.slot().binding.as_ref().map(QueueBinding::flags)
    }

    /// Returns the options currently in force, if an open was ever issued.
    #[must_use]
    pub fn options(&self) -> Option<QueueOptions> {
        self.slot().binding.as_ref().map(|binding| binding.options.clone())
    }

    /// Returns a snapshot of the binding together with the current state.
    #[must_use]
    pub fn snapshot(&self) -> (QueueState, Option<QueueBinding>) {
        let slot = self.slot();
        (slot.state, slot.binding.clone())
    }

    pub(crate) fn begin_open(&self, binding: QueueBinding) -> Result<(), QueueTransitionError> {
        let mut slot = self.slot();
        match slot.state {
            QueueState::Closed => {
                slot.transition_to(QueueState::Opening)?;
                slot.binding = Some(binding);
                Ok(())
            }
            QueueState::Opened => Err(QueueTransitionError::AlreadyOpened),
            _ => Err(slot.pending_or(QueueTransitionError::AlreadyOpened)),
        }
    }

    pub(crate) fn complete_open(&self, success: bool) -> Result<QueueState, QueueTransitionError> {
        let mut slot = self.slot();
        Self::expect_state(&slot, QueueState::Opening)?;
        if success {
            slot.transition_to(QueueState::Opened)?;
        } else {
            slot.transition_to(QueueState::Closed)?;
            slot.binding = None;
        }
        Ok(slot.state)
    }

    pub(crate) fn begin_configure(
        &self,
        options: QueueOptions,
    ) -> Result<(), QueueTransitionError> {
        let mut slot = self.slot();
        match slot.state {
            QueueState::Opened => {
                slot.transition_to(QueueState::Configuring)?;
                slot.staged_options = Some(options);
                Ok(())
            }
            QueueState::Closed => Err(QueueTransitionError::NotOpened { state: slot.state }),
            _ => Err(slot.pending_or(QueueTransitionError::NotOpened { state: slot.state })),
        }
    }

    pub(crate) fn complete_configure(
        &self,
        success: bool,
    ) -> Result<QueueState, QueueTransitionError> {
        let mut slot = self.slot();
        Self::expect_state(&slot, QueueState::Configuring)?;
        slot.transition_to(QueueState::Opened)?;
        let staged = slot.staged_options.take();
        if success && let (Some(options), Some(binding)) = (staged, slot.binding.as_mut()) {
            binding.options = options;
        }
        Ok(slot.state)
    }

    pub(crate) fn begin_close(&self) -> Result<(), QueueTransitionError> {
        let mut slot = self.slot();
        match slot.state {
            QueueState::Opened => slot.transition_to(QueueState::Closing),
            QueueState::Closed => Err(QueueTransitionError::NotOpened { state: slot.state }),
            _ => Err(slot.pending_or(QueueTransitionError::NotOpened { state: slot.state })),
        }
    }

    pub(crate) fn complete_close(&self, success: bool) -> Result<QueueState, QueueTransitionError> {
        let mut slot = self.slot();
        Self::expect_state(&slot, QueueState::Closing)?;
        let target = if success {
            QueueState::Closed
        } else {
            QueueState::Opened
        };
        slot.transition_to(target)?;
        Ok(slot.state)
    }

    /// Forces the queue closed, discarding any pending transition.
    pub(crate) fn invalidate(&self) {
        let mut slot = self.slot();
        slot.state = QueueState::Closed;
        slot.staged_options = None;
    }

    fn expect_state(slot: &QueueSlot, expected: QueueState) -> Result<(), QueueTransitionError> {
        if slot.state == expected {
            Ok(())
        } else {
            Err(QueueTransitionError::InvalidTransition {
                from: slot.state,
                to: expected,
            })
        }
    }

    fn slot(&self) -> MutexGuard<'_, QueueSlot> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for QueueId {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for QueueId {}

impl Hash for QueueId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.key.hash(state);
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.uri() {
            Some(uri) => write!(formatter, "{uri} (key {})", self.inner.key),
            None => write!(formatter, "unbound queue (key {})", self.inner.key),
        }
    }
}
