//! The request executor.
//!
//! # Design
//! `Client` owns a `ClientConfig` and nothing else. A call is split into
//! three steps: `build_request` merges configuration and encodes the body
//! (pure, finished before the first `.await`), `transport::send` performs the
//! I/O, and `parse_response` parses the body and classifies the status
//! (pure). The whole I/O step runs under the call's timeout; when it elapses
//! the in-flight future is dropped, which closes the connection.

use std::time::Duration;

use tracing::Instrument;

use crate::config::{ClientConfig, ClientOverrides};
use crate::error::RequestError;
use crate::http::{
    Headers, ParsedUrl, PreparedRequest, RequestBody, RequestConfig, RequestHandle,
    RequestOptions, Response, ResponseData, ResponseParts,
};
use crate::transport;

/// Asynchronous HTTP client holding per-instance defaults.
///
/// Cloning or deriving a client copies its configuration; the copies are
/// independent afterwards.
#[derive(Debug, Clone, Default)]
pub struct Client {
    config: ClientConfig,
}

impl Client {
    /// A client with the built-in defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Merge `patch` into this client's default headers.
    pub fn set_default_headers(&mut self, patch: &Headers) {
        self.config.headers.merge(patch);
    }

    /// Replace the default timeout for future requests.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    /// A new, independent client with `overrides` merged over this client's
    /// current configuration.
    pub fn derive(&self, overrides: &ClientOverrides) -> Client {
        Client::with_config(self.config.merged(overrides))
    }

    /// Resolve method, URL, headers, timeout and body for one call.
    ///
    /// Fails without touching the network when the URL, method or a header
    /// cannot be used.
    pub fn build_request(
        &self,
        method: &str,
        url: &str,
        options: &RequestOptions,
    ) -> Result<PreparedRequest, RequestError> {
        let parsed = ParsedUrl::parse(url)?;
        let method = method.to_ascii_uppercase();
        let http_method = http::Method::from_bytes(method.as_bytes())
            .map_err(|_| RequestError::InvalidMethod(method.clone()))?;
        let uri: http::Uri = parsed
            .path
            .parse()
            .map_err(|e| RequestError::InvalidUrl(format!("{url}: {e}")))?;

        let mut headers = self.config.headers.clone();
        headers.merge(&options.headers);
        if !headers.contains("host") {
            headers.insert("host", parsed.authority());
        }

        let body = options.data.as_ref().map(RequestBody::encode).transpose()?;
        if let Some(body) = &body {
            headers.insert("content-length", body.len().to_string());
        }

        let header_map = to_header_map(&headers)?;
        Ok(PreparedRequest {
            config: RequestConfig {
                method,
                url: parsed,
                headers,
                timeout: options.timeout.unwrap_or(self.config.timeout),
            },
            body,
            method: http_method,
            uri,
            header_map,
        })
    }

    /// Issue one request and wait for its single outcome.
    pub async fn execute(
        &self,
        method: &str,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, RequestError> {
        let prepared = self.build_request(method, url, &options)?;
        let client_config = &self.config;
        let (config, request) = prepared.into_http();
        let handle = RequestHandle::new(&config.method, url);

        let span = tracing::debug_span!(
            "request",
            id = %handle.id(),
            method = %config.method,
            url = %config.url
        );
        async move {
            tracing::debug!(timeout = ?config.timeout, "dispatching");
            let sent = tokio::time::timeout(
                config.timeout,
                transport::send(&config.url, request, client_config),
            )
            .await;
            match sent {
                Ok(Ok(parts)) => {
                    let result = parse_response(parts, config, handle);
                    match &result {
                        Ok(response) => tracing::debug!(status = response.status, "resolved"),
                        Err(err) => tracing::debug!(error = %err, "rejected"),
                    }
                    result
                }
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "request failed");
                    Err(err)
                }
                Err(_) => {
                    tracing::warn!("request timed out");
                    Err(RequestError::Timeout)
                }
            }
        }
        .instrument(span)
        .await
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<Response, RequestError> {
        self.execute("GET", url, options).await
    }

    pub async fn head(&self, url: &str, options: RequestOptions) -> Result<Response, RequestError> {
        self.execute("HEAD", url, options).await
    }

    pub async fn delete(&self, url: &str, options: RequestOptions) -> Result<Response, RequestError> {
        self.execute("DELETE", url, options).await
    }

    pub async fn post(
        &self,
        url: &str,
        data: Option<RequestBody>,
        options: RequestOptions,
    ) -> Result<Response, RequestError> {
        self.execute("POST", url, with_data(options, data)).await
    }

    pub async fn put(
        &self,
        url: &str,
        data: Option<RequestBody>,
        options: RequestOptions,
    ) -> Result<Response, RequestError> {
        self.execute("PUT", url, with_data(options, data)).await
    }

    pub async fn patch(
        &self,
        url: &str,
        data: Option<RequestBody>,
        options: RequestOptions,
    ) -> Result<Response, RequestError> {
        self.execute("PATCH", url, with_data(options, data)).await
    }
}

/// The `data` argument of the body-carrying verbs replaces `options.data`.
fn with_data(mut options: RequestOptions, data: Option<RequestBody>) -> RequestOptions {
    options.data = data;
    options
}

fn to_header_map(headers: &Headers) -> Result<http::HeaderMap, RequestError> {
    let mut map = http::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        let name = http::HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| RequestError::InvalidHeader(name.to_string()))?;
        let value = http::HeaderValue::from_str(value)
            .map_err(|_| RequestError::InvalidHeader(format!("{name}: {value}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Build the `Response` and classify it: 2xx resolves, anything else is a
/// `Status` error carrying the response.
pub fn parse_response(
    parts: ResponseParts,
    config: RequestConfig,
    request: RequestHandle,
) -> Result<Response, RequestError> {
    let status_text = parts
        .reason
        .or_else(|| {
            http::StatusCode::from_u16(parts.status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .map(str::to_string)
        })
        .unwrap_or_default();
    let response = Response {
        data: ResponseData::from_body(&parts.body),
        status: parts.status,
        status_text,
        headers: parts.headers,
        config,
        request,
    };
    if response.is_success() {
        Ok(response)
    } else {
        Err(RequestError::Status(Box::new(response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> Client {
        Client::new()
    }

    fn parts(status: u16, body: &str) -> ResponseParts {
        ResponseParts {
            status,
            reason: None,
            headers: Headers::from([("content-type", "application/json")]),
            body: body.as_bytes().to_vec(),
        }
    }

    fn prepared_config(method: &str) -> (RequestConfig, RequestHandle) {
        let req = client()
            .build_request(method, "http://example.test/ok", &RequestOptions::new())
            .unwrap();
        let handle = RequestHandle::new(&req.config.method, "http://example.test/ok");
        (req.config, handle)
    }

    #[test]
    fn build_get_has_no_body_and_default_headers() {
        let req = client()
            .build_request("get", "http://example.test/ok", &RequestOptions::new())
            .unwrap();
        assert_eq!(req.config.method, "GET");
        assert_eq!(req.config.url.path, "/ok");
        assert!(req.body.is_none());
        assert_eq!(req.config.headers.get("content-type"), Some("application/json"));
        assert_eq!(req.config.headers.get("host"), Some("example.test"));
        assert!(!req.config.headers.contains("content-length"));
        assert_eq!(req.config.timeout, Duration::from_millis(5000));
    }

    #[test]
    fn build_json_body_sets_content_length() {
        let options = RequestOptions::new().data(json!({"title": "x", "note": "héllo"}));
        let req = client()
            .build_request("POST", "http://example.test/posts", &options)
            .unwrap();
        let body = req.body.as_ref().unwrap();
        assert_eq!(
            req.config.headers.get("content-length"),
            Some(body.len().to_string().as_str())
        );
        let round: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(round, json!({"title": "x", "note": "héllo"}));
    }

    #[test]
    fn build_text_body_is_verbatim() {
        let options = RequestOptions::new().data("a=1&b=2");
        let req = client()
            .build_request("PUT", "http://example.test/form", &options)
            .unwrap();
        assert_eq!(req.body.as_deref(), Some(&b"a=1&b=2"[..]));
        assert_eq!(req.config.headers.get("content-length"), Some("7"));
    }

    #[test]
    fn post_without_data_sends_no_body() {
        let req = client()
            .build_request("POST", "http://example.test/posts", &with_data(RequestOptions::new(), None))
            .unwrap();
        assert!(req.body.is_none());
    }

    #[test]
    fn call_headers_and_timeout_win() {
        let c = Client::with_config(ClientConfig::new().header("x-k", "instance"));
        let options = RequestOptions::new()
            .header("X-K", "call")
            .timeout(Duration::ZERO);
        let req = c.build_request("GET", "http://example.test/", &options).unwrap();
        assert_eq!(req.config.headers.get("x-k"), Some("call"));
        assert_eq!(req.config.timeout, Duration::ZERO);
    }

    #[test]
    fn host_header_carries_non_default_port() {
        let req = client()
            .build_request("GET", "http://127.0.0.1:3000/x?y=1", &RequestOptions::new())
            .unwrap();
        assert_eq!(req.config.headers.get("host"), Some("127.0.0.1:3000"));
        let (_, http_req) = req.into_http();
        assert_eq!(http_req.uri(), "/x?y=1");
        assert_eq!(*http_req.method(), http::Method::GET);
    }

    #[test]
    fn malformed_url_fails_before_network() {
        let err = client()
            .build_request("GET", "not a url", &RequestOptions::new())
            .unwrap_err();
        assert!(matches!(err, RequestError::InvalidUrl(_)));
    }

    #[test]
    fn invalid_method_and_header_are_rejected() {
        let err = client()
            .build_request("GE T", "http://example.test/", &RequestOptions::new())
            .unwrap_err();
        assert!(matches!(err, RequestError::InvalidMethod(_)));

        let options = RequestOptions::new().header("x-bad", "line\nbreak");
        let err = client()
            .build_request("GET", "http://example.test/", &options)
            .unwrap_err();
        assert!(matches!(err, RequestError::InvalidHeader(_)));
    }

    #[test]
    fn derive_overrides_without_touching_parent() {
        let parent = Client::with_config(ClientConfig::new().header("k", "a"));
        let mut child = parent.derive(&ClientOverrides::new().header("k", "b"));
        assert_eq!(child.config().headers.get("k"), Some("b"));
        assert_eq!(parent.config().headers.get("k"), Some("a"));

        child.set_default_headers(&Headers::from([("x-child", "1")]));
        child.set_timeout(Duration::from_secs(1));
        assert!(!parent.config().headers.contains("x-child"));
        assert_eq!(parent.config().timeout, Duration::from_millis(5000));
    }

    #[test]
    fn derive_with_no_overrides_is_identical() {
        let mut parent = Client::new();
        parent.set_default_headers(&Headers::from([("authorization", "Bearer t")]));
        let child = parent.derive(&ClientOverrides::new());
        assert_eq!(child.config(), parent.config());

        parent.set_default_headers(&Headers::from([("authorization", "Bearer u")]));
        assert_eq!(child.config().headers.get("authorization"), Some("Bearer t"));
    }

    #[test]
    fn parse_success_json() {
        let (config, handle) = prepared_config("GET");
        let response = parse_response(parts(200, r#"{"id":1}"#), config, handle).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.status_text, "OK");
        assert_eq!(response.data, ResponseData::Json(json!({"id": 1})));
    }

    #[test]
    fn parse_non_json_success_is_text() {
        let (config, handle) = prepared_config("GET");
        let response = parse_response(parts(200, "<html></html>"), config, handle).unwrap();
        assert_eq!(response.data.as_text(), Some("<html></html>"));
    }

    #[test]
    fn parse_failure_status_attaches_response() {
        let (config, handle) = prepared_config("GET");
        let err = parse_response(parts(404, r#"{"error":"missing"}"#), config, handle).unwrap_err();
        assert_eq!(err.message(), "Request failed with status 404");
        let response = err.response().unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.status_text, "Not Found");
        assert_eq!(response.data, ResponseData::Json(json!({"error": "missing"})));
    }

    #[test]
    fn parse_keeps_server_reason_phrase() {
        let (config, handle) = prepared_config("GET");
        let mut p = parts(299, "");
        p.reason = Some("Custom Fine".to_string());
        let response = parse_response(p, config, handle).unwrap();
        assert_eq!(response.status_text, "Custom Fine");
    }

    #[test]
    fn classification_boundaries() {
        for (status, ok) in [(199, false), (200, true), (204, true), (299, true), (300, false), (500, false)] {
            let (config, handle) = prepared_config("GET");
            assert_eq!(parse_response(parts(status, ""), config, handle).is_ok(), ok, "status {status}");
        }
    }
}
