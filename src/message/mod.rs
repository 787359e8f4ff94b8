//! Messages, events and the builders that assemble outbound batches.
//!
//! # Architecture
//!
//! - **Domain**: identifiers, codec enumerations and the event model
//!   ([`domain::Event`], [`domain::MessageEvent`], [`domain::SessionEvent`])
//! - **Codec**: payload format checks and zlib compression applied at pack
//!   time ([`codec::encode_payload`]) and reversed on delivery
//! - **Builder**: write-only accumulators for `Put` events and consumer
//!   confirmations ([`builder::MessageEventBuilder`],
//!   [`builder::ConfirmEventBuilder`])

pub mod builder;
pub mod codec;
pub mod domain;

#[cfg(test)]
mod tests;
