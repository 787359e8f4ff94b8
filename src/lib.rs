//! mqsession: client-side session core for a queue-based message broker.
//!
//! The crate covers what an application needs between its code and the
//! broker connection: opening and configuring queues, posting messages and
//! matching their acknowledgements, confirming deliveries, and receiving
//! session and message events.
//!
//! # Architecture
//!
//! mqsession follows hexagonal architecture principles:
//!
//! - **Domain**: identifiers, options, events and state machines with no
//!   I/O
//! - **Ports**: the transport and event-handler contracts
//! - **Adapters**: an in-memory loopback broker
//!
//! # Modules
//!
//! - [`message`]: message identity, events, builders and payload encoding
//! - [`queue`]: queue URIs, flags, options and handles
//! - [`session`]: live and mock sessions

pub mod message;
pub mod queue;
pub mod session;
