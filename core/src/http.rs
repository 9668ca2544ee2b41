//! Plain-data types for one request/response exchange.
//!
//! # Design
//! These types describe the request as it will go over the wire and the
//! response as it came back, without holding on to any socket. The client
//! builds a `PreparedRequest`, the transport turns it into `ResponseParts`,
//! and `parse_response` turns those into the `Response` callers see. Keeping
//! the two ends as data means both halves can be tested without a network.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::{Host, Url};
use uuid::Uuid;

use crate::error::RequestError;

/// Header mapping with case-insensitive names.
///
/// Names are lower-cased on insert, so `Content-Type` and `content-type` are
/// the same entry. Insertion order is kept; a repeated insert replaces the
/// value in place (last write wins).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "std::collections::BTreeMap<String, String>")]
#[serde(into = "std::collections::BTreeMap<String, String>")]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert or replace a header. Returns the previous value, if any.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) -> Option<String> {
        let name = name.as_ref().to_ascii_lowercase();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.0.push((name, value));
                None
            }
        }
    }

    /// Add a value to a header, joining with `", "` when it is already set.
    pub fn append(&mut self, name: impl AsRef<str>, value: impl AsRef<str>) {
        let name = name.as_ref().to_ascii_lowercase();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(value.as_ref());
            }
            None => self.0.push((name, value.as_ref().to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.0.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.0.remove(idx).1)
    }

    /// Merge `other` on top of `self`; `other` wins on collisions.
    pub fn merge(&mut self, other: &Headers) {
        for (name, value) in &other.0 {
            self.insert(name, value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

impl<K: AsRef<str>, V: Into<String>, const N: usize> From<[(K, V); N]> for Headers {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<std::collections::BTreeMap<String, String>> for Headers {
    fn from(map: std::collections::BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<Headers> for std::collections::BTreeMap<String, String> {
    fn from(headers: Headers) -> Self {
        headers.0.into_iter().collect()
    }
}

/// A request body supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Serialized to JSON text before sending.
    Json(serde_json::Value),
    /// Sent verbatim.
    Text(String),
}

impl RequestBody {
    /// Build a JSON body from any serializable value.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, RequestError> {
        serde_json::to_value(value)
            .map(RequestBody::Json)
            .map_err(|e| RequestError::Serialization(e.to_string()))
    }

    /// The bytes that go on the wire.
    pub fn encode(&self) -> Result<Bytes, RequestError> {
        match self {
            RequestBody::Json(value) => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| RequestError::Serialization(e.to_string())),
            RequestBody::Text(text) => Ok(Bytes::from(text.clone())),
        }
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

/// Per-call options. Every field is optional; unset fields fall back to the
/// client's configuration.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Headers,
    pub timeout: Option<Duration>,
    pub data: Option<RequestBody>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn data(mut self, data: impl Into<RequestBody>) -> Self {
        self.data = Some(data.into());
        self
    }
}

/// Which transport a URL selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// Connection parameters derived from an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub scheme: Scheme,
    /// Host name or IP literal, without brackets.
    pub host: String,
    pub port: u16,
    /// Path plus query string, e.g. `/posts?userId=1`.
    pub path: String,
    ipv6: bool,
}

impl ParsedUrl {
    /// Parse an absolute URL. Only `https` selects TLS; every other scheme
    /// is sent over plain TCP.
    pub fn parse(input: &str) -> Result<Self, RequestError> {
        let url = Url::parse(input).map_err(|e| RequestError::InvalidUrl(format!("{input}: {e}")))?;
        let scheme = if url.scheme() == "https" {
            Scheme::Https
        } else {
            Scheme::Http
        };
        let (host, ipv6) = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => (domain.to_string(), false),
            Some(Host::Ipv4(ip)) => (ip.to_string(), false),
            Some(Host::Ipv6(ip)) => (ip.to_string(), true),
            _ => return Err(RequestError::InvalidUrl(format!("{input}: missing host"))),
        };
        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        Ok(Self {
            scheme,
            host,
            port: url.port().unwrap_or(scheme.default_port()),
            path,
            ipv6,
        })
    }

    pub fn is_tls(&self) -> bool {
        self.scheme == Scheme::Https
    }

    /// Value for the `host` header; the port is omitted when it is the
    /// scheme default.
    pub fn authority(&self) -> String {
        let host = if self.ipv6 {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == self.scheme.default_port() {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

impl fmt::Display for ParsedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Http => "http",
            Scheme::Https => "https",
        };
        write!(f, "{scheme}://{}{}", self.authority(), self.path)
    }
}

/// The resolved outbound configuration of one request, as sent.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestConfig {
    pub method: String,
    pub url: ParsedUrl,
    pub headers: Headers,
    pub timeout: Duration,
}

/// Opaque reference to a dispatched request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHandle {
    id: Uuid,
    method: String,
    url: String,
}

impl RequestHandle {
    /// A handle with a fresh request id.
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.to_string(),
            url: url.to_string(),
        }
    }

    /// Unique id of this request; also recorded on its tracing span.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// A request ready for the transport.
///
/// Built by `Client::build_request`. Method, URI and header values have been
/// validated, so turning it into an `http::Request` cannot fail.
#[derive(Debug)]
pub struct PreparedRequest {
    pub config: RequestConfig,
    pub body: Option<Bytes>,
    pub(crate) method: http::Method,
    pub(crate) uri: http::Uri,
    pub(crate) header_map: http::HeaderMap,
}

impl PreparedRequest {
    pub(crate) fn into_http(self) -> (RequestConfig, http::Request<Full<Bytes>>) {
        let mut request = http::Request::new(Full::new(self.body.unwrap_or_default()));
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.headers_mut() = self.header_map;
        (self.config, request)
    }
}

/// What the transport collected for one response.
#[derive(Debug, Clone)]
pub struct ResponseParts {
    pub status: u16,
    /// Reason phrase as sent by the server, when there was one.
    pub reason: Option<String>,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// A response body after best-effort JSON parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    /// The body parsed as JSON.
    Json(serde_json::Value),
    /// The body was not JSON (or was empty) and is delivered as text.
    Text(String),
}

impl ResponseData {
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice(body) {
            Ok(value) => ResponseData::Json(value),
            Err(_) => ResponseData::Text(String::from_utf8_lossy(body).into_owned()),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, ResponseData::Json(_))
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseData::Json(value) => Some(value),
            ResponseData::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseData::Text(text) => Some(text),
            ResponseData::Json(_) => None,
        }
    }
}

/// A completed response.
#[derive(Debug, Clone)]
pub struct Response {
    pub data: ResponseData,
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub config: RequestConfig,
    pub request: RequestHandle,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the response data into `T`.
    ///
    /// Text bodies are offered to `T` as a JSON string.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RequestError> {
        let value = match &self.data {
            ResponseData::Json(value) => value.clone(),
            ResponseData::Text(text) => serde_json::Value::String(text.clone()),
        };
        serde_json::from_value(value).map_err(|e| RequestError::Deserialization(e.to_string()))
    }
}
