//! Broker sessions: lifecycle, queue operations, posting, confirmation and
//! event delivery.
//!
//! A session owns the queues it opens, correlates every request with its
//! broker response, and delivers results either to a registered handler or
//! to a pull queue. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Session implementations in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
