//! Application callback port for push-style event delivery.

use crate::message::domain::{MessageEvent, SessionEvent};

/// Receives events on the session's dispatcher task.
///
/// Implementations must return promptly and must not wait on session
/// operations whose completion is delivered through the same dispatcher.
pub trait EventHandler: Send + Sync {
    /// Called for each session event.
    fn on_session_event(&self, event: &SessionEvent);

    /// Called for each message event.
    fn on_message_event(&self, event: &MessageEvent);
}
