//! Configuration module for the uplink.
//!
//! The configuration is plain data: endpoint, device identity, queue length,
//! socket timeouts and the retry policy. It is copied into the uplink at
//! init time and never changes afterwards.
//!
//! Values come from [`Config::default`], from environment variables
//! ([`Config::from_env`]) or from a JSON document ([`Config::from_json_str`]).

use std::env;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UplinkError;
use crate::queue::QUEUE_MAX_LEN;
use crate::retry::RetryPolicy;

/// Maximum host length (IP literal or DNS name).
pub const MAX_HOST_LEN: usize = 63;

/// Maximum HTTP path length.
pub const MAX_PATH_LEN: usize = 95;

/// Maximum device identifier length.
pub const MAX_DEVICE_ID_LEN: usize = 31;

/// Default server host
const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
const DEFAULT_PORT: u16 = 8080;

/// Default ingestion path
const DEFAULT_PATH: &str = "/api/uplink";

/// Default device identifier
const DEFAULT_DEVICE_ID: &str = "edge-device-01";

/// Default socket send timeout in milliseconds
const DEFAULT_SEND_TIMEOUT_MS: u32 = 2000;

/// Default socket receive timeout in milliseconds
const DEFAULT_RECV_TIMEOUT_MS: u32 = 2000;

/// Host string
pub type Host = heapless::String<MAX_HOST_LEN>;

/// HTTP path string
pub type UrlPath = heapless::String<MAX_PATH_LEN>;

/// Device identifier string
pub type DeviceId = heapless::String<MAX_DEVICE_ID_LEN>;

/// URL scheme of the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plaintext HTTP
    #[default]
    Http,

    /// HTTPS; reserved for a secured transport
    Https,
}

impl FromStr for Scheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(ConfigError {
                message: format!("unknown scheme '{}'", other),
                env_var: None,
            }),
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// Where events are posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    /// HTTP or HTTPS
    pub scheme: Scheme,

    /// IP literal, or DNS name when `use_dns` is set
    pub host: Host,

    /// Server port
    pub port: u16,

    /// Request path, e.g. `/api/uplink`
    pub path: UrlPath,

    /// Resolve `host` through DNS instead of parsing it as an IP literal
    pub use_dns: bool,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            scheme: Scheme::Http,
            host: fixed(DEFAULT_HOST),
            port: DEFAULT_PORT,
            path: fixed(DEFAULT_PATH),
            use_dns: false,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }
}

/// TLS settings, reserved for a future secured transport.
///
/// The plaintext HTTP transport ignores this block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Use TLS (requires the HTTPS scheme)
    pub enable: bool,

    /// Verify the server certificate
    pub verify_server: bool,

    /// SNI host name
    pub sni_host: Host,
}

/// Configuration for the uplink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server endpoint
    pub endpoint: Endpoint,

    /// Device identifier sent with every event
    pub device_id: DeviceId,

    /// Queue capacity (1..=QUEUE_MAX_LEN)
    pub queue_len: u16,

    /// Connect/send timeout in milliseconds
    pub send_timeout_ms: u32,

    /// Receive timeout in milliseconds
    pub recv_timeout_ms: u32,

    /// Backoff policy for failed sends
    pub retry: RetryPolicy,

    /// Reserved TLS settings
    pub tls: TlsConfig,
}

/// Error type for configuration loading and validation failures
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for UplinkError {
    fn from(_: ConfigError) -> Self {
        UplinkError::InvalidArg
    }
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: None,
        }
    }
}

impl Config {
    /// Check every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.host.is_empty() {
            return Err(ConfigError::invalid("endpoint host must not be empty"));
        }
        if self.endpoint.port == 0 {
            return Err(ConfigError::invalid("endpoint port must be non-zero"));
        }
        if !self.endpoint.path.starts_with('/') {
            return Err(ConfigError::invalid("endpoint path must start with '/'"));
        }
        if self.device_id.is_empty() {
            return Err(ConfigError::invalid("device id must not be empty"));
        }
        if self.queue_len == 0 || usize::from(self.queue_len) > QUEUE_MAX_LEN {
            return Err(ConfigError::invalid(format!(
                "queue length {} outside 1..={}",
                self.queue_len, QUEUE_MAX_LEN
            )));
        }
        if self.send_timeout_ms == 0 || self.recv_timeout_ms == 0 {
            return Err(ConfigError::invalid("timeouts must be greater than 0"));
        }
        if self.retry.base_delay_ms == 0 {
            return Err(ConfigError::invalid("retry base delay must be greater than 0"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::invalid(format!(
                "retry max delay {} is below base delay {}",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }
        if self.retry.jitter_pct > 100 {
            return Err(ConfigError::invalid(format!(
                "jitter {}% exceeds maximum (100%)",
                self.retry.jitter_pct
            )));
        }
        if self.tls.enable && self.endpoint.scheme != Scheme::Https {
            return Err(ConfigError::invalid("TLS requires the https scheme"));
        }
        Ok(())
    }

    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their default value:
    /// - `UPLINK_SCHEME`: `http` or `https` (default: http)
    /// - `UPLINK_SERVER_HOST`: IP literal or DNS name (default: 127.0.0.1)
    /// - `UPLINK_SERVER_PORT`: server port (default: 8080)
    /// - `UPLINK_SERVER_PATH`: request path (default: /api/uplink)
    /// - `UPLINK_USE_DNS`: resolve the host via DNS (default: false)
    /// - `UPLINK_DEVICE_ID`: device identifier (default: edge-device-01)
    /// - `UPLINK_QUEUE_LEN`: queue capacity (default: 8)
    /// - `UPLINK_SEND_TIMEOUT_MS` / `UPLINK_RECV_TIMEOUT_MS` (default: 2000)
    /// - `UPLINK_RETRY_BASE_MS` / `UPLINK_RETRY_MAX_MS` (default: 500 / 10000)
    /// - `UPLINK_RETRY_MAX_ATTEMPTS`: 0 = unlimited (default: 10)
    /// - `UPLINK_RETRY_JITTER_PCT` (default: 20)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable cannot be parsed, a string is too
    /// long, or the resulting configuration fails [`Config::validate`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use edge_uplink::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Endpoint: {}", config.endpoint);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// `from_env` is this function over the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let endpoint = Endpoint {
            scheme: parse_var(&lookup, "UPLINK_SCHEME", defaults.endpoint.scheme)?,
            host: bounded_var(&lookup, "UPLINK_SERVER_HOST", defaults.endpoint.host)?,
            port: parse_var(&lookup, "UPLINK_SERVER_PORT", defaults.endpoint.port)?,
            path: bounded_var(&lookup, "UPLINK_SERVER_PATH", defaults.endpoint.path)?,
            use_dns: parse_var(&lookup, "UPLINK_USE_DNS", defaults.endpoint.use_dns)?,
        };

        let retry = RetryPolicy {
            base_delay_ms: parse_var(
                &lookup,
                "UPLINK_RETRY_BASE_MS",
                defaults.retry.base_delay_ms,
            )?,
            max_delay_ms: parse_var(&lookup, "UPLINK_RETRY_MAX_MS", defaults.retry.max_delay_ms)?,
            max_attempts: parse_var(
                &lookup,
                "UPLINK_RETRY_MAX_ATTEMPTS",
                defaults.retry.max_attempts,
            )?,
            jitter_pct: parse_var(&lookup, "UPLINK_RETRY_JITTER_PCT", defaults.retry.jitter_pct)?,
        };

        let config = Self {
            endpoint,
            device_id: bounded_var(&lookup, "UPLINK_DEVICE_ID", defaults.device_id)?,
            queue_len: parse_var(&lookup, "UPLINK_QUEUE_LEN", defaults.queue_len)?,
            send_timeout_ms: parse_var(
                &lookup,
                "UPLINK_SEND_TIMEOUT_MS",
                defaults.send_timeout_ms,
            )?,
            recv_timeout_ms: parse_var(
                &lookup,
                "UPLINK_RECV_TIMEOUT_MS",
                defaults.recv_timeout_ms,
            )?,
            retry,
            tls: defaults.tls,
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration document.
    ///
    /// Missing fields take their default value. The result is validated.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConfigError::invalid(format!("invalid JSON configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::invalid(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }
}

impl Default for Config {
    /// Create a default configuration using default values.
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            device_id: fixed(DEFAULT_DEVICE_ID),
            queue_len: QUEUE_MAX_LEN as u16,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            recv_timeout_ms: DEFAULT_RECV_TIMEOUT_MS,
            retry: RetryPolicy::default(),
            tls: TlsConfig::default(),
        }
    }
}

/// Bounded copy of a compile-time default that is known to fit.
fn fixed<const N: usize>(value: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    // Defaults are all far below their bounds
    let _ = out.push_str(value);
    out
}

/// Parse an optional variable, keeping `default` when it is unset.
fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError {
            message: format!("'{}' is not a valid value", value),
            env_var: Some(key.to_string()),
        }),
        None => Ok(default),
    }
}

/// Read an optional bounded string variable.
fn bounded_var<const N: usize, F>(
    lookup: &F,
    key: &str,
    default: heapless::String<N>,
) -> Result<heapless::String<N>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => crate::message::bounded(&value).map_err(|_| ConfigError {
            message: format!(
                "value of length {} exceeds maximum length ({})",
                value.len(),
                N
            ),
            env_var: Some(key.to_string()),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    // Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let original = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                original,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.original {
                Some(val) => env::set_var(&self.key, val),
                None => env::remove_var(&self.key),
            }
        }
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.endpoint.scheme, Scheme::Http);
        assert_eq!(config.endpoint.port, 8080);
        assert_eq!(config.endpoint.path.as_str(), "/api/uplink");
        assert!(!config.endpoint.use_dns);
        assert_eq!(usize::from(config.queue_len), QUEUE_MAX_LEN);
        assert_eq!(config.send_timeout_ms, 2000);
        assert_eq!(config.recv_timeout_ms, 2000);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(!config.tls.enable);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint::default();
        assert_eq!(endpoint.to_string(), "http://127.0.0.1:8080/api/uplink");
    }

    #[test]
    fn test_from_lookup_with_defaults() {
        let config = Config::from_lookup(|_| None).expect("Should load with defaults");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_lookup_custom_values() {
        let lookup = lookup_from(&[
            ("UPLINK_SERVER_HOST", "10.0.0.5"),
            ("UPLINK_SERVER_PORT", "9000"),
            ("UPLINK_SERVER_PATH", "/ingest"),
            ("UPLINK_DEVICE_ID", "gateway-3"),
            ("UPLINK_QUEUE_LEN", "4"),
            ("UPLINK_RETRY_MAX_ATTEMPTS", "0"),
            ("UPLINK_RETRY_JITTER_PCT", " 5 "),
            ("UPLINK_USE_DNS", "true"),
        ]);

        let config = Config::from_lookup(lookup).expect("Should load custom values");
        assert_eq!(config.endpoint.host.as_str(), "10.0.0.5");
        assert_eq!(config.endpoint.port, 9000);
        assert_eq!(config.endpoint.path.as_str(), "/ingest");
        assert!(config.endpoint.use_dns);
        assert_eq!(config.device_id.as_str(), "gateway-3");
        assert_eq!(config.queue_len, 4);
        assert_eq!(config.retry.max_attempts, 0);
        assert_eq!(config.retry.jitter_pct, 5);
    }

    #[test]
    fn test_invalid_number() {
        let lookup = lookup_from(&[("UPLINK_SERVER_PORT", "not_a_number")]);

        let err = Config::from_lookup(lookup).unwrap_err();
        assert!(err.message.contains("not a valid value"));
        assert_eq!(err.env_var.as_deref(), Some("UPLINK_SERVER_PORT"));
    }

    #[test]
    fn test_host_too_long() {
        let long_host = "h".repeat(MAX_HOST_LEN + 1);
        let lookup = lookup_from(&[("UPLINK_SERVER_HOST", long_host.as_str())]);

        let err = Config::from_lookup(lookup).unwrap_err();
        assert!(err.message.contains("exceeds maximum length"));
    }

    #[test]
    fn test_unknown_scheme() {
        let lookup = lookup_from(&[("UPLINK_SCHEME", "ftp")]);
        let err = Config::from_lookup(lookup).unwrap_err();
        assert_eq!(err.env_var.as_deref(), Some("UPLINK_SCHEME"));

        let lookup = lookup_from(&[("UPLINK_SCHEME", "HTTPS")]);
        let config = Config::from_lookup(lookup).unwrap();
        assert_eq!(config.endpoint.scheme, Scheme::Https);
    }

    #[test]
    fn test_queue_len_out_of_range() {
        let lookup = lookup_from(&[("UPLINK_QUEUE_LEN", "0")]);
        assert!(Config::from_lookup(lookup).is_err());

        let too_big = (QUEUE_MAX_LEN + 1).to_string();
        let lookup = lookup_from(&[("UPLINK_QUEUE_LEN", too_big.as_str())]);
        let err = Config::from_lookup(lookup).unwrap_err();
        assert!(err.message.contains("queue length"));
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut config = Config::default();
        config.endpoint.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.endpoint.path = fixed("api/uplink");
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.endpoint.host.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.device_id.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.recv_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.base_delay_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.max_delay_ms = config.retry.base_delay_ms - 1;
        assert!(config.validate().unwrap_err().message.contains("below base delay"));

        let mut config = Config::default();
        config.retry.jitter_pct = 101;
        assert!(config.validate().unwrap_err().message.contains("exceeds maximum"));
    }

    #[test]
    fn test_tls_requires_https() {
        let mut config = Config::default();
        config.tls.enable = true;
        assert!(config.validate().is_err());

        config.endpoint.scheme = Scheme::Https;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial_document() {
        let json = r#"{
            "endpoint": { "host": "192.168.1.20", "port": 8081 },
            "device_id": "bench-1",
            "retry": { "max_attempts": 3 }
        }"#;

        let config = Config::from_json_str(json).expect("Should parse JSON config");
        assert_eq!(config.endpoint.host.as_str(), "192.168.1.20");
        assert_eq!(config.endpoint.port, 8081);
        assert_eq!(config.endpoint.path.as_str(), "/api/uplink");
        assert_eq!(config.device_id.as_str(), "bench-1");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 500);
    }

    #[test]
    fn test_from_json_round_trips_defaults() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("\"scheme\":\"http\""));
        assert_eq!(Config::from_json_str(&json).unwrap(), Config::default());
    }

    #[test]
    fn test_from_json_invalid() {
        let err = Config::from_json_str("{ not json").unwrap_err();
        assert!(err.message.contains("invalid JSON"));

        let err = Config::from_json_str(r#"{"queue_len": 0}"#).unwrap_err();
        assert!(err.message.contains("queue length"));
    }

    #[test]
    fn test_from_env_reads_process_environment() {
        let _guard = EnvGuard::set("UPLINK_DEVICE_ID", "env-device");

        let config = Config::from_env().expect("Should load from environment");
        assert_eq!(config.device_id.as_str(), "env-device");
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError {
            message: "test error".to_string(),
            env_var: Some("TEST_VAR".to_string()),
        };
        assert_eq!(
            format!("{}", error),
            "Configuration error for TEST_VAR: test error"
        );

        let error_no_var = ConfigError {
            message: "general error".to_string(),
            env_var: None,
        };
        assert_eq!(
            format!("{}", error_no_var),
            "Configuration error: general error"
        );
    }

    #[test]
    fn test_config_error_maps_to_invalid_arg() {
        let err: UplinkError = ConfigError::invalid("x").into();
        assert_eq!(err, UplinkError::InvalidArg);
    }
}
