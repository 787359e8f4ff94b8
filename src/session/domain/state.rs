//! Session lifecycle state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created but never started.
    #[default]
    Unstarted,
    /// Connecting to the broker.
    Starting,
    /// Connected; queue operations are accepted.
    Started,
    /// Shutting down; no new operations are accepted.
    Stopping,
    /// Shut down.
    Stopped,
    /// The transport failed unrecoverably.
    Errored,
}

impl SessionState {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Errored => "errored",
        }
    }

    /// Returns whether queue operations are accepted.
    #[must_use]
    pub const fn accepts_operations(self) -> bool {
        matches!(self, Self::Started)
    }

    /// Returns whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Errored)
    }

    /// Returns whether transition to `target` is allowed.
    ///
    /// A failed connect returns `Starting` to `Unstarted`. `Errored` is
    /// reachable from every non-terminal state.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Unstarted, Self::Starting | Self::Stopped | Self::Errored)
                | (Self::Starting, Self::Started | Self::Unstarted | Self::Errored)
                | (Self::Started, Self::Stopping | Self::Errored)
                | (Self::Stopping, Self::Stopped | Self::Errored)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ALL_STATES: [SessionState; 6] = [
        SessionState::Unstarted,
        SessionState::Starting,
        SessionState::Started,
        SessionState::Stopping,
        SessionState::Stopped,
        SessionState::Errored,
    ];

    #[rstest]
    #[case(SessionState::Unstarted, SessionState::Starting, true)]
    #[case(SessionState::Unstarted, SessionState::Started, false)]
    #[case(SessionState::Starting, SessionState::Started, true)]
    #[case(SessionState::Starting, SessionState::Unstarted, true)]
    #[case(SessionState::Started, SessionState::Stopping, true)]
    #[case(SessionState::Started, SessionState::Stopped, false)]
    #[case(SessionState::Stopping, SessionState::Stopped, true)]
    #[case(SessionState::Stopping, SessionState::Started, false)]
    #[case(SessionState::Started, SessionState::Errored, true)]
    fn transition_matrix(
        #[case] from: SessionState,
        #[case] to: SessionState,
        #[case] expected: bool,
    ) {
        assert_eq!(from.can_transition_to(to), expected);
    }

    #[test]
    fn terminal_states_have_no_exit() {
        for from in ALL_STATES.into_iter().filter(|state| state.is_terminal()) {
            for to in ALL_STATES {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn only_started_accepts_operations() {
        let accepting: Vec<_> = ALL_STATES
            .into_iter()
            .filter(|state| state.accepts_operations())
            .collect();
        assert_eq!(accepting, vec![SessionState::Started]);
    }
}
