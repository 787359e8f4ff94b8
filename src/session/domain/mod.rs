//! Domain model for sessions: lifecycle, configuration and operation
//! requests.

mod options;
mod request;
mod state;

pub use options::{BrokerEndpoint, DEFAULT_BROKER_URI, SessionConfigError, SessionOptions};
pub use request::{
    CloseQueueRequest, ConfigureQueueRequest, OpenQueueRequest, OperationKind, RequestId,
};
pub use state::SessionState;
