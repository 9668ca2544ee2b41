//! Per-client defaults: headers, timeout and response size cap.
//!
//! # Design
//! A `ClientConfig` is owned by exactly one `Client`. Deriving a client clones
//! the configuration and merges overrides on top, so parent and child never
//! share state. When loaded from JSON only the documented keys are read;
//! anything else in the document is ignored.

use std::time::Duration;

use rustls::pki_types::CertificateDer;
use serde::Deserialize;

use crate::http::Headers;

/// Timeout applied when neither the client nor the call sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Largest response body buffered before the call fails.
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

pub const DEFAULT_USER_AGENT: &str = concat!("courier/", env!("CARGO_PKG_VERSION"));

/// Headers every client starts with.
pub fn default_headers() -> Headers {
    Headers::from([
        ("user-agent", DEFAULT_USER_AGENT),
        ("content-type", "application/json"),
    ])
}

/// Default settings for every request a client issues.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "ConfigFile")]
pub struct ClientConfig {
    pub timeout: Duration,
    pub headers: Headers,
    /// `None` buffers bodies of any size.
    pub max_body_size: Option<usize>,
    /// Trust anchors accepted for `https` in addition to the Mozilla root set.
    pub root_certificates: Vec<CertificateDer<'static>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            headers: default_headers(),
            max_body_size: Some(DEFAULT_MAX_BODY_SIZE),
            root_certificates: Vec::new(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set one default header on top of the built-in ones.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Merge a set of default headers on top of the current ones.
    pub fn headers(mut self, headers: &Headers) -> Self {
        self.headers.merge(headers);
        self
    }

    pub fn max_body_size(mut self, limit: Option<usize>) -> Self {
        self.max_body_size = limit;
        self
    }

    /// Trust `certificate` as an additional root, e.g. a private CA or a
    /// self-signed server certificate.
    pub fn root_certificate(mut self, certificate: CertificateDer<'static>) -> Self {
        self.root_certificates.push(certificate);
        self
    }

    /// Load from a JSON document such as
    /// `{"timeout_ms": 2000, "headers": {"x-api-key": "..."}}`.
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    /// A copy of this configuration with `overrides` merged on top.
    pub fn merged(&self, overrides: &ClientOverrides) -> Self {
        let mut merged = self.clone();
        if let Some(timeout) = overrides.timeout {
            merged.timeout = timeout;
        }
        merged.headers.merge(&overrides.headers);
        if let Some(limit) = overrides.max_body_size {
            merged.max_body_size = limit;
        }
        merged
    }
}

/// Settings applied on top of an existing configuration by `Client::derive`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOverrides {
    pub timeout: Option<Duration>,
    pub headers: Headers,
    pub max_body_size: Option<Option<usize>>,
}

impl ClientOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn max_body_size(mut self, limit: Option<usize>) -> Self {
        self.max_body_size = Some(limit);
        self
    }
}

/// On-disk shape of a `ClientConfig`. A `max_body_size` of 0 disables the cap.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    timeout_ms: Option<u64>,
    headers: Headers,
    max_body_size: Option<usize>,
}

impl From<ConfigFile> for ClientConfig {
    fn from(file: ConfigFile) -> Self {
        let mut config = ClientConfig::default().headers(&file.headers);
        if let Some(ms) = file.timeout_ms {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(limit) = file.max_body_size {
            config.max_body_size = (limit > 0).then_some(limit);
        }
        config
    }
}
