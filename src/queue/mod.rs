//! Queue addressing, capability flags, options and session-scoped handles.
//!
//! Everything a caller prepares before asking a session to open a queue lives
//! in [`domain`].

pub mod domain;
