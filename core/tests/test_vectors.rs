//! Verify request building and response classification against the JSON
//! vectors stored in `test-vectors/`.
//!
//! Request vectors cover URL parsing, header merge order, timeout resolution
//! and body encoding. Response vectors cover body parsing and status
//! classification. Bodies are compared as parsed JSON where possible to avoid
//! false negatives from field ordering.

use std::time::Duration;

use courier_core::{
    parse_response, Client, ClientConfig, Headers, RequestBody, RequestError, RequestHandle,
    RequestOptions, ResponseData, ResponseParts, Scheme,
};
use serde_json::Value;

fn parse_scheme(s: &str) -> Scheme {
    match s {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        other => panic!("unknown scheme: {other}"),
    }
}

fn options_from(case: &Value) -> RequestOptions {
    let mut options = RequestOptions::new();
    if let Some(headers) = case.get("headers") {
        options.headers = serde_json::from_value::<Headers>(headers.clone()).unwrap();
    }
    if let Some(ms) = case.get("timeout_ms").and_then(Value::as_u64) {
        options.timeout = Some(Duration::from_millis(ms));
    }
    if let Some(data) = case.get("data_json") {
        options.data = Some(RequestBody::Json(data.clone()));
    }
    if let Some(text) = case.get("data_text").and_then(Value::as_str) {
        options.data = Some(RequestBody::Text(text.to_string()));
    }
    options
}

fn expected_data(expected: &Value) -> ResponseData {
    if let Some(json) = expected.get("data_json") {
        ResponseData::Json(json.clone())
    } else {
        ResponseData::Text(expected["data_text"].as_str().unwrap().to_string())
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[test]
fn request_test_vectors() {
    let raw = include_str!("../../test-vectors/requests.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let config = ClientConfig::from_json(&case["client"].to_string()).unwrap();
        let client = Client::with_config(config);
        let options = options_from(&case["options"]);

        let result = client.build_request(
            case["method"].as_str().unwrap(),
            case["url"].as_str().unwrap(),
            &options,
        );

        if let Some(expected_error) = case.get("expected_error") {
            let err = result.unwrap_err();
            match expected_error.as_str().unwrap() {
                "InvalidUrl" => assert!(matches!(err, RequestError::InvalidUrl(_)), "{name}: expected InvalidUrl"),
                "InvalidMethod" => assert!(matches!(err, RequestError::InvalidMethod(_)), "{name}: expected InvalidMethod"),
                other => panic!("{name}: unknown expected_error: {other}"),
            }
            continue;
        }

        let req = result.unwrap();
        let expected = &case["expected"];
        assert_eq!(req.config.method, expected["method"].as_str().unwrap(), "{name}: method");
        assert_eq!(req.config.url.scheme, parse_scheme(expected["scheme"].as_str().unwrap()), "{name}: scheme");
        assert_eq!(req.config.url.host, expected["host"].as_str().unwrap(), "{name}: host");
        assert_eq!(req.config.url.port as u64, expected["port"].as_u64().unwrap(), "{name}: port");
        assert_eq!(req.config.url.path, expected["path"].as_str().unwrap(), "{name}: path");
        assert_eq!(
            req.config.timeout,
            Duration::from_millis(expected["timeout_ms"].as_u64().unwrap()),
            "{name}: timeout"
        );

        for (header, value) in expected["headers"].as_object().unwrap() {
            assert_eq!(req.config.headers.get(header), value.as_str(), "{name}: header {header}");
        }

        match expected["body"].as_str() {
            None => assert!(req.body.is_none(), "{name}: body should be None"),
            Some(body) => {
                let sent = std::str::from_utf8(req.body.as_deref().unwrap()).unwrap();
                match serde_json::from_str::<Value>(body) {
                    Ok(json) => assert_eq!(serde_json::from_str::<Value>(sent).unwrap(), json, "{name}: body"),
                    Err(_) => assert_eq!(sent, body, "{name}: body"),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[test]
fn response_test_vectors() {
    let raw = include_str!("../../test-vectors/responses.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    let client = Client::new();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let url = "http://example.test/vector";
        let req = client.build_request("GET", url, &RequestOptions::new()).unwrap();
        let handle = RequestHandle::new("GET", url);

        let status = case["status"].as_u64().unwrap() as u16;
        let parts = ResponseParts {
            status,
            reason: case["reason"].as_str().map(str::to_string),
            headers: Headers::new(),
            body: case["body"].as_str().unwrap().as_bytes().to_vec(),
        };
        let expected = &case["expected"];
        let result = parse_response(parts, req.config, handle);

        let response = if expected["ok"].as_bool().unwrap() {
            result.unwrap()
        } else {
            let err = result.unwrap_err();
            assert_eq!(err.message(), expected["message"].as_str().unwrap(), "{name}: message");
            err.into_response().unwrap()
        };
        assert_eq!(response.status, status, "{name}: status");
        assert_eq!(response.status_text, expected["status_text"].as_str().unwrap(), "{name}: status text");
        assert_eq!(response.data, expected_data(expected), "{name}: data");
    }
}
