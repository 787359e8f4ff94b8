//! Session services: the live broker session, its in-process double and
//! the machinery they share.

mod api;
mod correlation;
mod delivery;
mod engine;
mod error;
mod live;
mod mock;

pub use api::QueueSession;
pub use error::{SessionError, SessionResult};
pub use live::Session;
pub use mock::MockSession;
