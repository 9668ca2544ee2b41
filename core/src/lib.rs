//! Minimal asynchronous HTTP client.
//!
//! # Overview
//! Issues one request per call over plain TCP or TLS, encodes JSON or text
//! bodies, buffers the response, parses JSON when it can and classifies the
//! outcome by status code, all bounded by a timeout.
//!
//! # Design
//! - `Client` owns only its `ClientConfig`; there is no shared default
//!   instance, callers construct the client they need.
//! - Each call is split into `build_request` (pure), the transport exchange
//!   (I/O, under the timeout) and `parse_response` (pure), so the two pure
//!   halves are testable without a network.
//! - Every failure is a `RequestError`; only `RequestError::Status` carries
//!   the server's response.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
mod transport;

pub use crate::client::{parse_response, Client};
pub use crate::config::{ClientConfig, ClientOverrides};
pub use crate::error::RequestError;
pub use rustls::pki_types::CertificateDer;
pub use crate::http::{
    Headers, ParsedUrl, PreparedRequest, RequestBody, RequestConfig, RequestHandle,
    RequestOptions, Response, ResponseData, ResponseParts, Scheme,
};
