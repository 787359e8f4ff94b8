//! Queue addresses of the form `bmq://domain[~tier]/queue[?id=app]`.

use super::QueueDomainError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

const SCHEME: &str = "bmq";
const SCHEME_SEPARATOR: &str = "://";
const TIER_SEPARATOR: char = '~';
const APP_ID_KEY: &str = "id";

/// Maximum length of the domain part.
pub const MAX_DOMAIN_LENGTH: usize = 128;

/// Maximum length of the queue name.
pub const MAX_QUEUE_NAME_LENGTH: usize = 255;

/// Stable digest of a URI's normalised form used for fast lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UriKey(u64);

impl UriKey {
    /// Returns the digest value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UriKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{:016x}", self.0)
    }
}

/// Validated, normalised queue address.
///
/// The scheme, domain and tier are lowercased and an empty application id is
/// dropped, so equivalent spellings produce equal values. Equality and
/// hashing use the normalised form.
#[derive(Debug, Clone)]
pub struct Uri {
    normalized: String,
    domain: String,
    tier: Option<String>,
    queue: String,
    app_id: Option<String>,
}

impl Uri {
    /// Parses and validates a queue address.
    ///
    /// # Errors
    ///
    /// Returns [`QueueDomainError::MalformedUri`] for syntax violations and
    /// the other [`QueueDomainError`] variants for well-formed addresses that
    /// are semantically invalid.
    pub fn parse(input: &str) -> Result<Self, QueueDomainError> {
        let malformed = |reason: &str| QueueDomainError::MalformedUri {
            uri: input.to_owned(),
            reason: reason.to_owned(),
        };

        let (scheme, remainder) = input
            .split_once(SCHEME_SEPARATOR)
            .ok_or_else(|| malformed("missing '://' after scheme"))?;
        if scheme.is_empty() || !scheme.chars().all(is_scheme_char) {
            return Err(malformed("scheme must be non-empty alphanumeric"));
        }
        let scheme = scheme.to_ascii_lowercase();
        if scheme != SCHEME {
            return Err(QueueDomainError::UnsupportedScheme(scheme));
        }

        let (path, query) = match remainder.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (remainder, None),
        };
        let (authority, queue) = path
            .split_once('/')
            .ok_or_else(|| malformed("missing '/' before queue name"))?;

        let (domain, tier) = match authority.split_once(TIER_SEPARATOR) {
            Some((domain, tier)) => (domain, Some(tier)),
            None => (authority, None),
        };
        if domain.is_empty() {
            return Err(malformed("domain must not be empty"));
        }
        if !domain.chars().all(is_domain_char) {
            return Err(malformed("domain contains invalid characters"));
        }
        if domain.len() > MAX_DOMAIN_LENGTH {
            return Err(QueueDomainError::DomainTooLong {
                domain: domain.to_owned(),
                limit: MAX_DOMAIN_LENGTH,
            });
        }
        let tier = match tier {
            Some("") => return Err(QueueDomainError::EmptyTier(input.to_owned())),
            Some(value) if !value.chars().all(is_tier_char) => {
                return Err(malformed("tier contains invalid characters"));
            }
            Some(value) => Some(value.to_ascii_lowercase()),
            None => None,
        };

        if queue.is_empty() {
            return Err(QueueDomainError::EmptyQueueName(input.to_owned()));
        }
        if !queue.chars().all(is_queue_char) {
            return Err(malformed("queue name contains invalid characters"));
        }
        if queue.len() > MAX_QUEUE_NAME_LENGTH {
            return Err(QueueDomainError::QueueNameTooLong {
                queue: queue.to_owned(),
                limit: MAX_QUEUE_NAME_LENGTH,
            });
        }

        let app_id = match query {
            None => None,
            Some(query) => {
                let (key, value) = query
                    .split_once('=')
                    .ok_or_else(|| malformed("query must have the form 'id=<app>'"))?;
                if key != APP_ID_KEY {
                    return Err(QueueDomainError::UnknownQueryParameter(key.to_owned()));
                }
                if !value.chars().all(is_domain_char) {
                    return Err(malformed("application id contains invalid characters"));
                }
                (!value.is_empty()).then(|| value.to_owned())
            }
        };

        Ok(Self::from_parts(
            domain.to_ascii_lowercase(),
            tier,
            queue.to_owned(),
            app_id,
        ))
    }

    fn from_parts(
        domain: String,
        tier: Option<String>,
        queue: String,
        app_id: Option<String>,
    ) -> Self {
        let mut normalized = format!("{SCHEME}{SCHEME_SEPARATOR}{domain}");
        if let Some(tier_value) = &tier {
            normalized.push(TIER_SEPARATOR);
            normalized.push_str(tier_value);
        }
        normalized.push('/');
        normalized.push_str(&queue);
        if let Some(app) = &app_id {
            normalized.push_str("?id=");
            normalized.push_str(app);
        }

        Self {
            normalized,
            domain,
            tier,
            queue,
            app_id,
        }
    }

    /// Returns the normalised string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// Returns the domain without tier.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns the tier, if any.
    #[must_use]
    pub fn tier(&self) -> Option<&str> {
        self.tier.as_deref()
    }

    /// Returns the domain followed by `~tier` when a tier is present.
    #[must_use]
    pub fn qualified_domain(&self) -> String {
        self.tier.as_ref().map_or_else(
            || self.domain.clone(),
            |tier| format!("{}{TIER_SEPARATOR}{tier}", self.domain),
        )
    }

    /// Returns the queue name.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Returns the application id from the `?id=` query, if any.
    #[must_use]
    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    /// Returns the queue-level address without tier and application id.
    #[must_use]
    pub fn canonical(&self) -> Self {
        Self::from_parts(self.domain.clone(), None, self.queue.clone(), None)
    }

    /// Returns whether this address is already in canonical form.
    #[must_use]
    pub const fn is_canonical(&self) -> bool {
        self.tier.is_none() && self.app_id.is_none()
    }

    /// Returns the stable lookup key derived from the normalised form.
    #[must_use]
    pub fn id(&self) -> UriKey {
        let digest = Sha256::digest(self.normalized.as_bytes());
        let value = digest
            .iter()
            .take(8)
            .fold(0_u64, |acc, byte| (acc << 8) | u64::from(*byte));
        UriKey(value)
    }
}

const fn is_scheme_char(character: char) -> bool {
    character.is_ascii_alphanumeric() || matches!(character, '+' | '.' | '-')
}

const fn is_domain_char(character: char) -> bool {
    character.is_ascii_alphanumeric() || matches!(character, '.' | '_' | '-')
}

const fn is_tier_char(character: char) -> bool {
    character.is_ascii_alphanumeric() || character == '-'
}

const fn is_queue_char(character: char) -> bool {
    character.is_ascii_alphanumeric() || matches!(character, '.' | '_' | '-' | '~')
}

impl PartialEq for Uri {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for Uri {}

impl Hash for Uri {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.normalized)
    }
}

impl FromStr for Uri {
    type Err = QueueDomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for Uri {
    type Error = QueueDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl AsRef<str> for Uri {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Serialize for Uri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.normalized)
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// Assembles a [`Uri`] from its parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UriBuilder {
    domain: String,
    tier: Option<String>,
    queue: String,
    app_id: Option<String>,
}

impl UriBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the domain, leaving any tier untouched.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Sets the tier.
    #[must_use]
    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    /// Sets domain and tier from a `domain~tier` string.
    #[must_use]
    pub fn with_qualified_domain(mut self, qualified: &str) -> Self {
        match qualified.split_once(TIER_SEPARATOR) {
            Some((domain, tier)) => {
                self.domain = domain.to_owned();
                self.tier = Some(tier.to_owned());
            }
            None => {
                self.domain = qualified.to_owned();
                self.tier = None;
            }
        }
        self
    }

    /// Sets the queue name.
    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Sets the application id.
    #[must_use]
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Builds and validates the address.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Uri::parse`].
    pub fn build(&self) -> Result<Uri, QueueDomainError> {
        let mut text = format!("{SCHEME}{SCHEME_SEPARATOR}{}", self.domain);
        if let Some(tier) = &self.tier {
            text.push(TIER_SEPARATOR);
            text.push_str(tier);
        }
        text.push('/');
        text.push_str(&self.queue);
        if let Some(app_id) = &self.app_id {
            text.push_str("?id=");
            text.push_str(app_id);
        }
        Uri::parse(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_all_parts() {
        let uri = Uri::parse("bmq://my.domain~lon/queue1?id=billing").expect("valid uri");

        assert_eq!(uri.domain(), "my.domain");
        assert_eq!(uri.tier(), Some("lon"));
        assert_eq!(uri.qualified_domain(), "my.domain~lon");
        assert_eq!(uri.queue(), "queue1");
        assert_eq!(uri.app_id(), Some("billing"));
        assert!(!uri.is_canonical());
        assert_eq!(uri.canonical().as_str(), "bmq://my.domain/queue1");
        assert!(uri.canonical().is_canonical());
    }

    #[rstest]
    #[case("bmq://my.domain/queue1")]
    #[case("bmq://my.domain~tier-1/queue.with_parts")]
    #[case("bmq://my.domain/queue1?id=app_1")]
    #[case("BMQ://My.Domain~LON/Queue1?id=")]
    fn string_form_is_idempotent(#[case] input: &str) {
        let uri = Uri::parse(input).expect("valid uri");
        let reparsed = Uri::parse(&uri.to_string()).expect("normalised form parses");
        assert_eq!(reparsed, uri);
        assert_eq!(reparsed.to_string(), uri.to_string());
    }

    #[test]
    fn equivalent_spellings_compare_equal() {
        let lower = Uri::parse("bmq://my.domain/queue1").expect("valid uri");
        let mixed = Uri::parse("BMQ://MY.Domain/queue1?id=").expect("valid uri");

        assert_eq!(lower, mixed);
        assert_eq!(lower.id(), mixed.id());
        assert_eq!(mixed.as_str(), "bmq://my.domain/queue1");
    }

    #[test]
    fn queue_name_is_case_sensitive() {
        let lower = Uri::parse("bmq://my.domain/queue").expect("valid uri");
        let upper = Uri::parse("bmq://my.domain/QUEUE").expect("valid uri");
        assert_ne!(lower, upper);
        assert_ne!(lower.id(), upper.id());
    }

    #[rstest]
    #[case("my.domain/queue")]
    #[case("bmq:/my.domain/queue")]
    #[case("://my.domain/queue")]
    #[case("bmq://my.domain")]
    #[case("bmq:///queue")]
    #[case("bmq://my domain/queue")]
    #[case("bmq://my.domain/que/ue")]
    #[case("bmq://my.domain~t!er/queue")]
    #[case("bmq://my.domain/queue?app")]
    fn syntax_violations_are_parse_errors(#[case] input: &str) {
        let error = Uri::parse(input).expect_err("input should be rejected");
        assert!(error.is_parse_error(), "expected parse error, got {error:?}");
    }

    #[rstest]
    #[case("http://my.domain/queue", QueueDomainError::UnsupportedScheme("http".to_owned()))]
    #[case(
        "bmq://my.domain/",
        QueueDomainError::EmptyQueueName("bmq://my.domain/".to_owned())
    )]
    #[case(
        "bmq://my.domain~/queue",
        QueueDomainError::EmptyTier("bmq://my.domain~/queue".to_owned())
    )]
    #[case(
        "bmq://my.domain/queue?group=x",
        QueueDomainError::UnknownQueryParameter("group".to_owned())
    )]
    fn semantic_violations_are_validation_errors(
        #[case] input: &str,
        #[case] expected: QueueDomainError,
    ) {
        let error = Uri::parse(input).expect_err("input should be rejected");
        assert!(!error.is_parse_error());
        assert_eq!(error, expected);
    }

    #[test]
    fn overlong_parts_are_rejected() {
        let long_domain = format!("bmq://{}/queue", "d".repeat(MAX_DOMAIN_LENGTH + 1));
        assert!(matches!(
            Uri::parse(&long_domain),
            Err(QueueDomainError::DomainTooLong { .. })
        ));

        let long_queue = format!("bmq://domain/{}", "q".repeat(MAX_QUEUE_NAME_LENGTH + 1));
        assert!(matches!(
            Uri::parse(&long_queue),
            Err(QueueDomainError::QueueNameTooLong { .. })
        ));
    }

    #[test]
    fn builder_assembles_qualified_addresses() {
        let uri = UriBuilder::new()
            .with_qualified_domain("my.domain~dev")
            .with_queue("orders")
            .with_app_id("audit")
            .build()
            .expect("valid parts");

        assert_eq!(uri.as_str(), "bmq://my.domain~dev/orders?id=audit");
    }

    #[test]
    fn builder_rejects_missing_queue() {
        let result = UriBuilder::new().with_domain("my.domain").build();
        assert!(matches!(result, Err(QueueDomainError::EmptyQueueName(_))));
    }

    #[test]
    fn serde_round_trips_through_string() {
        let uri = Uri::parse("bmq://my.domain/queue1").expect("valid uri");
        let encoded = serde_json::to_string(&uri).expect("serialise uri");
        assert_eq!(encoded, "\"bmq://my.domain/queue1\"");
        let decoded: Uri = serde_json::from_str(&encoded).expect("deserialise uri");
        assert_eq!(decoded, uri);
        assert!(serde_json::from_str::<Uri>("\"not a uri\"").is_err());
    }
}
