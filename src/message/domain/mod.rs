//! Domain types for messages and events.
//!
//! This module contains pure value types with no infrastructure
//! dependencies: identifiers, result codes, codec selections, messages and
//! the events that carry them.

mod codec;
mod correlation;
mod error;
mod event;
mod guid;
mod message;
mod status;

pub use codec::{CodecSelection, CompressionAlgorithmType, EncodingType};
pub use correlation::CorrelationId;
pub use error::MessageDomainError;
pub use event::{
    Event, MessageEvent, MessageEventType, MessageIter, SessionEvent, SessionEventType,
};
pub use guid::MessageGuid;
pub use message::{MAX_PAYLOAD_SIZE, Message, PutMessage};
pub use status::ResultCode;
