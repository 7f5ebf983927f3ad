//! Per-call options.
//!
//! Options can be built in code or loaded from a TOML file:
//!
//! ```toml
//! authority = "cache.internal:50051"
//! scheme = "https"
//! timeout = "30s"
//! max_message_size = 1048576
//!
//! [metadata]
//! authorization = "Bearer abc"
//! ```

use crate::error::ConfigError;
use crate::frame::DEFAULT_MAX_MESSAGE_SIZE;
use crate::headers::{HeaderField, Timeout};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// URI scheme sent in the `:scheme` pseudo-header.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Cleartext HTTP/2 (h2c).
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Options for opening a call.
#[derive(Debug, Clone, Deserialize)]
pub struct CallOptions {
    /// `host:port` of the logical service, sent as `:authority`.
    pub authority: String,
    #[serde(default)]
    pub scheme: Scheme,
    /// Advisory deadline sent as `grpc-timeout`. Fractions round up to the
    /// next whole second.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Extra headers appended after the required gRPC headers.
    #[serde(default, deserialize_with = "deserialize_metadata")]
    pub metadata: Vec<(String, String)>,
    /// Largest response message the decoder accepts.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_timeout() -> Duration {
    Timeout::default().as_duration()
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn deserialize_metadata<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let table = BTreeMap::<String, String>::deserialize(deserializer)?;
    Ok(table.into_iter().collect())
}

impl CallOptions {
    /// Options for `authority` with default scheme, timeout and limits.
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            scheme: Scheme::default(),
            timeout: default_timeout(),
            metadata: Vec::new(),
            max_message_size: default_max_message_size(),
        }
    }

    /// Set the scheme.
    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Set the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Append an extra header.
    pub fn metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((name.into(), value.into()));
        self
    }

    /// Set the maximum response message size.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// The timeout as sent on the wire.
    pub fn grpc_timeout(&self) -> Timeout {
        Timeout::from_duration(self.timeout)
    }

    /// Extra headers in insertion order.
    pub fn extra_headers(&self) -> impl Iterator<Item = HeaderField> + '_ {
        self.metadata
            .iter()
            .map(|(k, v)| HeaderField::from_slices(k.as_bytes(), v.as_bytes()))
    }

    /// Load options from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        let options: Self =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Check the options can produce a valid request.
    ///
    /// Runs on [`load`](Self::load) and again when a call is opened.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.authority.is_empty() {
            return Err(ConfigError::Invalid("authority must not be empty".into()));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "max_message_size must be greater than zero".into(),
            ));
        }
        for (name, _) in &self.metadata {
            if name.is_empty() || name.starts_with(':') {
                return Err(ConfigError::Invalid(format!(
                    "invalid metadata name: {name:?}"
                )));
            }
            if name.bytes().any(|b| b.is_ascii_uppercase()) {
                return Err(ConfigError::Invalid(format!(
                    "metadata name must be lowercase: {name:?}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let options = CallOptions::new("localhost:50051");
        assert_eq!(options.scheme, Scheme::Http);
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert!(options.metadata.is_empty());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let options = CallOptions::new("svc:443")
            .scheme(Scheme::Https)
            .timeout(Duration::from_millis(1500))
            .metadata("authorization", "Bearer t")
            .max_message_size(1024);
        assert_eq!(options.scheme.as_str(), "https");
        assert_eq!(options.grpc_timeout().to_grpc_format(), "2S");
        assert_eq!(options.max_message_size, 1024);

        let extra: Vec<_> = options.extra_headers().collect();
        assert_eq!(
            extra,
            vec![HeaderField::from_slices(b"authorization", b"Bearer t")]
        );
    }

    #[test]
    fn test_load_minimal() {
        let file = write_config("authority = \"cache:50051\"\n");
        let options = CallOptions::load(file.path()).unwrap();
        assert_eq!(options.authority, "cache:50051");
        assert_eq!(options.scheme, Scheme::Http);
        assert_eq!(options.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_load_full() {
        let file = write_config(
            r#"
authority = "cache:50051"
scheme = "https"
timeout = "1m 30s"
max_message_size = 65536

[metadata]
x-request-id = "42"
authorization = "Bearer abc"
"#,
        );
        let options = CallOptions::load(file.path()).unwrap();
        assert_eq!(options.scheme, Scheme::Https);
        assert_eq!(options.timeout, Duration::from_secs(90));
        assert_eq!(options.max_message_size, 65536);
        assert_eq!(
            options.metadata,
            vec![
                ("authorization".to_string(), "Bearer abc".to_string()),
                ("x-request-id".to_string(), "42".to_string()),
            ]
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = CallOptions::load("/nonexistent/grpc.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_load_parse_error() {
        let file = write_config("scheme = \"gopher\"\n");
        let err = CallOptions::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_rejects_pseudo_header() {
        let options = CallOptions::new("svc:1").metadata(":path", "/evil");
        assert!(matches!(
            options.validate(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_rejects_uppercase() {
        let options = CallOptions::new("svc:1").metadata("X-Trace", "1");
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_authority() {
        assert!(CallOptions::new("").validate().is_err());
    }
}
