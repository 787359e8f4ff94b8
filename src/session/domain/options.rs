//! Session configuration.
//!
//! Options deserialise from JSON with every field defaulted. Durations are
//! expressed in milliseconds on the wire.

use crate::message::domain::MAX_PAYLOAD_SIZE;
use crate::queue::domain::QueueOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

const TCP_SCHEME: &str = "tcp://";

/// Default broker address.
pub const DEFAULT_BROKER_URI: &str = "tcp://localhost:30114";

/// Errors raised while loading or validating session options.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionConfigError {
    /// The JSON document could not be parsed.
    #[error("invalid session options document: {0}")]
    Parse(String),

    /// The broker address is not `tcp://host:port`.
    #[error("invalid broker URI '{uri}': {reason}")]
    InvalidBrokerUri {
        /// Offending value.
        uri: String,
        /// Description of the problem.
        reason: &'static str,
    },

    /// A timeout is zero.
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    /// The low watermark is not below the high watermark.
    #[error("event queue low watermark {low} must be below high watermark {high}")]
    WatermarkOrder {
        /// Configured low watermark.
        low: usize,
        /// Configured high watermark.
        high: usize,
    },

    /// The payload limit is zero or above the protocol maximum.
    #[error("max payload size {0} is outside 1..={MAX_PAYLOAD_SIZE}")]
    PayloadLimit(usize),

    /// The default queue options are unusable.
    #[error("default queue options are invalid: {0}")]
    QueueOptions(String),
}

/// Parsed broker address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerEndpoint {
    host: String,
    port: u16,
}

impl BrokerEndpoint {
    /// Parses a `tcp://host:port` address.
    ///
    /// # Errors
    ///
    /// Returns [`SessionConfigError::InvalidBrokerUri`] when the scheme,
    /// host or port is missing or malformed.
    pub fn parse(uri: &str) -> Result<Self, SessionConfigError> {
        let invalid = |reason| SessionConfigError::InvalidBrokerUri {
            uri: uri.to_owned(),
            reason,
        };
        let authority = uri
            .strip_prefix(TCP_SCHEME)
            .ok_or_else(|| invalid("scheme must be tcp"))?;
        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port_number = port
            .parse::<u16>()
            .map_err(|_| invalid("port is not a number in 0..=65535"))?;
        Ok(Self {
            host: host.to_owned(),
            port: port_number,
        })
    }

    /// Returns the host name.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the TCP port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{TCP_SCHEME}{}:{}", self.host, self.port)
    }
}

/// Configuration for one session.
///
/// # Examples
///
/// ```
/// use mqsession::session::domain::SessionOptions;
/// use std::time::Duration;
///
/// let options = SessionOptions::from_json_str(r#"{"open_queue_timeout": 2500}"#)
///     .expect("valid options");
/// assert_eq!(options.open_queue_timeout, Duration::from_millis(2500));
/// assert_eq!(options.broker_uri, "tcp://localhost:30114");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Broker address as `tcp://host:port`.
    pub broker_uri: String,
    /// Process name reported to the broker instead of the executable name.
    pub process_name_override: Option<String>,
    /// Upper bound on connecting to the broker.
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    /// Upper bound on an open request.
    #[serde(with = "millis")]
    pub open_queue_timeout: Duration,
    /// Upper bound on a configure request.
    #[serde(with = "millis")]
    pub configure_queue_timeout: Duration,
    /// Upper bound on a close request.
    #[serde(with = "millis")]
    pub close_queue_timeout: Duration,
    /// Pull-queue depth at which a slow consumer is considered caught up.
    pub event_queue_low_watermark: usize,
    /// Pull-queue depth above which a slow consumer is signalled.
    pub event_queue_high_watermark: usize,
    /// Largest payload accepted by message builders and for decoded
    /// deliveries.
    pub max_payload_size: usize,
    /// Options applied to opens that do not supply their own.
    pub default_queue_options: QueueOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            broker_uri: DEFAULT_BROKER_URI.to_owned(),
            process_name_override: None,
            connect_timeout: Duration::from_secs(60),
            open_queue_timeout: Duration::from_secs(300),
            configure_queue_timeout: Duration::from_secs(300),
            close_queue_timeout: Duration::from_secs(300),
            event_queue_low_watermark: 50,
            event_queue_high_watermark: 2_000,
            max_payload_size: MAX_PAYLOAD_SIZE,
            default_queue_options: QueueOptions::default(),
        }
    }
}

impl SessionOptions {
    /// Parses options from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`SessionConfigError::Parse`] for malformed JSON and any
    /// error from [`Self::validate`].
    pub fn from_json_str(document: &str) -> Result<Self, SessionConfigError> {
        let options: Self = serde_json::from_str(document)
            .map_err(|err| SessionConfigError::Parse(err.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Sets the broker address.
    #[must_use]
    pub fn with_broker_uri(mut self, uri: impl Into<String>) -> Self {
        self.broker_uri = uri.into();
        self
    }

    /// Sets the same timeout for open, configure and close requests.
    #[must_use]
    pub const fn with_queue_operation_timeout(mut self, timeout: Duration) -> Self {
        self.open_queue_timeout = timeout;
        self.configure_queue_timeout = timeout;
        self.close_queue_timeout = timeout;
        self
    }

    /// Sets the slow-consumer watermarks.
    #[must_use]
    pub const fn with_watermarks(mut self, low: usize, high: usize) -> Self {
        self.event_queue_low_watermark = low;
        self.event_queue_high_watermark = high;
        self
    }

    /// Sets the largest payload accepted for posting and delivery.
    #[must_use]
    pub const fn with_max_payload_size(mut self, limit: usize) -> Self {
        self.max_payload_size = limit;
        self
    }

    /// Sets the options applied to opens that do not supply their own.
    #[must_use]
    pub fn with_default_queue_options(mut self, options: QueueOptions) -> Self {
        self.default_queue_options = options;
        self
    }

    /// Returns the parsed broker address.
    ///
    /// # Errors
    ///
    /// Returns [`SessionConfigError::InvalidBrokerUri`].
    pub fn endpoint(&self) -> Result<BrokerEndpoint, SessionConfigError> {
        BrokerEndpoint::parse(&self.broker_uri)
    }

    /// Checks the options for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns the first [`SessionConfigError`] found.
    pub fn validate(&self) -> Result<(), SessionConfigError> {
        self.endpoint()?;
        for (name, timeout) in [
            ("connect_timeout", self.connect_timeout),
            ("open_queue_timeout", self.open_queue_timeout),
            ("configure_queue_timeout", self.configure_queue_timeout),
            ("close_queue_timeout", self.close_queue_timeout),
        ] {
            if timeout.is_zero() {
                return Err(SessionConfigError::ZeroTimeout(name));
            }
        }
        if self.event_queue_low_watermark >= self.event_queue_high_watermark {
            return Err(SessionConfigError::WatermarkOrder {
                low: self.event_queue_low_watermark,
                high: self.event_queue_high_watermark,
            });
        }
        if self.max_payload_size == 0 || self.max_payload_size > MAX_PAYLOAD_SIZE {
            return Err(SessionConfigError::PayloadLimit(self.max_payload_size));
        }
        let codec = self.default_queue_options.codec();
        codec
            .validate()
            .map_err(|err| SessionConfigError::QueueOptions(err.to_string()))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::domain::EncodingType;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        let options = SessionOptions::default();
        assert_eq!(options.validate(), Ok(()));
        assert_eq!(options.event_queue_low_watermark, 50);
        assert_eq!(options.event_queue_high_watermark, 2_000);
        assert_eq!(
            options.endpoint().map(|endpoint| endpoint.port()),
            Ok(30_114)
        );
    }

    #[test]
    fn json_round_trip_uses_milliseconds() {
        let options = SessionOptions::default().with_queue_operation_timeout(Duration::from_millis(1500));

        let json = serde_json::to_value(&options).expect("options serialise");

        assert_eq!(json["open_queue_timeout"], 1500);
        let parsed: SessionOptions = serde_json::from_value(json).expect("options deserialise");
        assert_eq!(parsed, options);
    }

    #[rstest]
    #[case("tcp://broker.example:30114", Ok(("broker.example", 30_114)))]
    #[case("http://broker:1", Err("scheme must be tcp"))]
    #[case("tcp://broker", Err("missing port"))]
    #[case("tcp://:30114", Err("missing host"))]
    #[case("tcp://broker:99999", Err("port is not a number in 0..=65535"))]
    fn broker_uri_parsing(#[case] uri: &str, #[case] expected: Result<(&str, u16), &'static str>) {
        let result = BrokerEndpoint::parse(uri);
        match expected {
            Ok((host, port)) => {
                let endpoint = result.expect("endpoint should parse");
                assert_eq!((endpoint.host(), endpoint.port()), (host, port));
                assert_eq!(endpoint.to_string(), uri);
            }
            Err(reason) => assert_eq!(
                result,
                Err(SessionConfigError::InvalidBrokerUri {
                    uri: uri.to_owned(),
                    reason
                })
            ),
        }
    }

    #[rstest]
    #[case(r#"{"open_queue_timeout": 0}"#, SessionConfigError::ZeroTimeout("open_queue_timeout"))]
    #[case(
        r#"{"event_queue_low_watermark": 10, "event_queue_high_watermark": 10}"#,
        SessionConfigError::WatermarkOrder { low: 10, high: 10 }
    )]
    #[case(r#"{"max_payload_size": 0}"#, SessionConfigError::PayloadLimit(0))]
    fn invalid_documents_are_rejected(#[case] document: &str, #[case] expected: SessionConfigError) {
        assert_eq!(SessionOptions::from_json_str(document), Err(expected));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            SessionOptions::from_json_str("{"),
            Err(SessionConfigError::Parse(_))
        ));
    }

    #[test]
    fn unpostable_default_codec_is_rejected() {
        let options = SessionOptions::default().with_default_queue_options(
            QueueOptions::new().with_encoding(EncodingType::Undefined),
        );
        assert!(matches!(
            options.validate(),
            Err(SessionConfigError::QueueOptions(_))
        ));
    }
}
