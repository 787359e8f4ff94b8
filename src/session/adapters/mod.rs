//! Transport adapters for the session module.
//!
//! # Available Adapters
//!
//! - [`loopback::LoopbackBroker`]: in-memory broker that answers requests,
//!   acknowledges posts and routes messages between queues of the same
//!   session, for tests and local development

pub mod loopback;

pub use loopback::LoopbackBroker;
