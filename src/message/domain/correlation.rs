//! Correlation identifiers linking requests to their asynchronous results.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Process-wide source of auto-assigned correlation values.
///
/// Values are strictly increasing and never reused.
static NEXT_AUTO_VALUE: AtomicU64 = AtomicU64::new(1);

type AnyValue = dyn Any + Send + Sync;

/// Token correlating a request with the event that completes it.
///
/// Exactly one variant is active. Numeric and auto values compare by value;
/// pointer and shared values compare by the identity of the referenced
/// allocation.
#[derive(Clone, Default)]
pub enum CorrelationId {
    /// No correlation was supplied.
    #[default]
    Unset,
    /// Caller-chosen integer.
    Numeric(i64),
    /// Weak back-reference to an application-owned object.
    ///
    /// Holding the id never keeps the object alive.
    Pointer(Weak<AnyValue>),
    /// Shared ownership of an application value.
    Shared(Arc<AnyValue>),
    /// Value synthesised by the library when the caller supplied none.
    Auto(u64),
}

impl CorrelationId {
    /// Creates a numeric correlation id.
    #[must_use]
    pub const fn numeric(value: i64) -> Self {
        Self::Numeric(value)
    }

    /// Creates a weak back-reference to `target`.
    #[must_use]
    pub fn pointer<T: Any + Send + Sync>(target: &Arc<T>) -> Self {
        let erased: Arc<AnyValue> = target.clone();
        Self::Pointer(Arc::downgrade(&erased))
    }

    /// Creates a correlation id that shares ownership of `value`.
    #[must_use]
    pub fn shared<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self::Shared(value)
    }

    /// Draws the next auto-assigned value.
    #[must_use]
    pub fn auto() -> Self {
        Self::Auto(NEXT_AUTO_VALUE.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns `self` unless unset, in which case an auto value is drawn.
    #[must_use]
    pub fn or_auto(self) -> Self {
        if self.is_unset() { Self::auto() } else { self }
    }

    /// Returns whether no correlation is held.
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Returns whether this is a caller-chosen integer.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Numeric(_))
    }

    /// Returns whether this is a weak back-reference.
    #[must_use]
    pub const fn is_pointer(&self) -> bool {
        matches!(self, Self::Pointer(_))
    }

    /// Returns whether this id shares ownership of a value.
    #[must_use]
    pub const fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }

    /// Returns whether the library synthesised this id.
    #[must_use]
    pub const fn is_auto_value(&self) -> bool {
        matches!(self, Self::Auto(_))
    }

    /// Returns whether this is a back-reference whose target was dropped.
    #[must_use]
    pub fn is_dangling(&self) -> bool {
        match self {
            Self::Pointer(target) => target.strong_count() == 0,
            _ => false,
        }
    }

    /// Returns the numeric value, if any.
    #[must_use]
    pub const fn as_numeric(&self) -> Option<i64> {
        match self {
            Self::Numeric(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the auto-assigned value, if any.
    #[must_use]
    pub const fn as_auto_value(&self) -> Option<u64> {
        match self {
            Self::Auto(value) => Some(*value),
            _ => None,
        }
    }

    /// Resolves a back-reference to its target while it is still alive.
    #[must_use]
    pub fn upgrade_pointer<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Self::Pointer(target) => target.upgrade()?.downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Returns the shared value when it has type `T`.
    #[must_use]
    pub fn shared_value<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Self::Shared(value) => value.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    fn identity(&self) -> Identity {
        match self {
            Self::Unset => Identity::Unset,
            Self::Numeric(value) => Identity::Numeric(*value),
            Self::Pointer(target) => Identity::Address(target.as_ptr().cast::<()>() as usize),
            Self::Shared(value) => Identity::Address(Arc::as_ptr(value).cast::<()>() as usize),
            Self::Auto(value) => Identity::Auto(*value),
        }
    }

    const fn variant_name(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Numeric(_) => "numeric",
            Self::Pointer(_) => "pointer",
            Self::Shared(_) => "shared",
            Self::Auto(_) => "auto",
        }
    }
}

#[derive(PartialEq, Eq, Hash)]
enum Identity {
    Unset,
    Numeric(i64),
    Address(usize),
    Auto(u64),
}

impl PartialEq for CorrelationId {
    fn eq(&self, other: &Self) -> bool {
        self.variant_name() == other.variant_name() && self.identity() == other.identity()
    }
}

impl Eq for CorrelationId {}

impl Hash for CorrelationId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.variant_name().hash(state);
        self.identity().hash(state);
    }
}

impl From<i64> for CorrelationId {
    fn from(value: i64) -> Self {
        Self::Numeric(value)
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => formatter.write_str("CorrelationId(unset)"),
            Self::Numeric(value) => write!(formatter, "CorrelationId(numeric={value})"),
            Self::Pointer(target) => {
                write!(formatter, "CorrelationId(pointer={:p})", target.as_ptr())
            }
            Self::Shared(value) => {
                write!(formatter, "CorrelationId(shared={:p})", Arc::as_ptr(value))
            }
            Self::Auto(value) => write!(formatter, "CorrelationId(auto={value})"),
        }
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => formatter.write_str("[ unset ]"),
            Self::Numeric(value) => write!(formatter, "[ numeric = {value} ]"),
            Self::Pointer(target) => write!(formatter, "[ pointer = {:p} ]", target.as_ptr()),
            Self::Shared(value) => write!(formatter, "[ shared = {:p} ]", Arc::as_ptr(value)),
            Self::Auto(value) => write!(formatter, "[ autoValue = {value} ]"),
        }
    }
}
