//! Connection configuration.
//!
//! A [`ConnectionConfig`] can be built in code or parsed from any
//! `serde_json::Value` (a JSON file, a TOML table converted by the caller,
//! ...). Keys may be written plainly (`"host"`) or symbol-style with a leading
//! colon (`":host"`), as Ruby and some YAML dumps do; both spellings normalise
//! to the same [`HostSpec`].
//!
//! ```rust
//! use elementary::ConnectionConfig;
//! use serde_json::json;
//!
//! let plain = ConnectionConfig::from_value(json!({
//!     "hosts": [{ "host": "foo", "prefix": "/bar" }]
//! })).unwrap();
//! let symbolic = ConnectionConfig::from_value(json!({
//!     ":hosts": [{ ":host": "foo", ":prefix": "/bar" }]
//! })).unwrap();
//!
//! assert_eq!(plain, symbolic);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Free-form option mapping. Used for `transport_options` and middleware
/// options; keys and values are passed through untouched.
pub type Options = Map<String, Value>;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8000;

/// One candidate endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path prefix in front of every RPC path. May be empty.
    #[serde(default)]
    pub prefix: String,
}

impl HostSpec {
    pub fn new(host: impl Into<String>, port: u16, prefix: impl Into<String>) -> Self {
        Self { host: host.into(), port, prefix: prefix.into() }
    }
}

impl Default for HostSpec {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT, "")
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_hosts() -> Vec<HostSpec> {
    vec![HostSpec::default()]
}

/// Everything a [`Connection`](crate::Connection) needs besides the service.
///
/// Owned by exactly one connection and never mutated after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_hosts")]
    pub hosts: Vec<HostSpec>,
    /// Handed to [`SelectTransport`](crate::SelectTransport) verbatim.
    #[serde(default)]
    pub transport_options: Options,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { hosts: default_hosts(), transport_options: Options::new() }
    }
}

impl ConnectionConfig {
    /// Single-host configuration.
    pub fn with_host(host: HostSpec) -> Self {
        Self { hosts: vec![host], ..Self::default() }
    }

    pub fn transport_options(mut self, options: Options) -> Self {
        self.transport_options = options;
        self
    }

    /// Parses a configuration mapping, accepting plain and `:symbol` keys.
    ///
    /// `null` is treated as an empty mapping. `transport_options` keep their
    /// keys exactly as given.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let value = match value {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let Value::Object(map) = value else {
            return Err(Error::invalid("connection options must be a mapping"));
        };

        let mut normalised = Map::new();
        for (key, value) in map {
            let key = strip_symbol(&key).to_owned();
            let value = if key == "transport_options" { value } else { normalise_keys(value) };
            normalised.insert(key, value);
        }

        let config: Self = serde_json::from_value(Value::Object(normalised))
            .map_err(|e| Error::invalid(format!("connection options: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the transport relies on.
    pub fn validate(&self) -> Result<(), Error> {
        if self.hosts.is_empty() {
            return Err(Error::invalid("at least one host is required"));
        }
        if let Some(i) = self.hosts.iter().position(|h| h.host.trim().is_empty()) {
            return Err(Error::invalid(format!("hosts[{i}].host must not be empty")));
        }
        Ok(())
    }
}

fn strip_symbol(key: &str) -> &str {
    key.strip_prefix(':').unwrap_or(key)
}

fn normalise_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (strip_symbol(&k).to_owned(), normalise_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalise_keys).collect()),
        other => other,
    }
}
