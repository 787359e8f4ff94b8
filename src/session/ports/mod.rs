//! Port contracts for the session context.

pub mod handler;
pub mod transport;

pub use handler::EventHandler;
pub use transport::{
    InboundFrame, OperationResponse, OutboundFrame, PutFrame, Transport, TransportError,
    TransportErrorKind, TransportResult,
};
