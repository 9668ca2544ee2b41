//! Error type for client calls.
//!
//! # Design
//! Every failure of a call surfaces as one `RequestError`. Callers tell
//! "the server answered with a failure status" apart from "no answer was
//! obtained" by checking `response()`: only `Status` carries a response.

use thiserror::Error;

use crate::http::Response;

/// Errors returned by `Client` calls.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The URL could not be parsed or has no host. Raised before any
    /// network activity.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The method is not a valid HTTP token.
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    /// A header name or value cannot be sent.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The request body could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Response data could not be deserialized into the requested type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// DNS, connect, TLS or protocol failure; carries the transport's message.
    #[error("{0}")]
    Transport(String),

    /// The call did not complete within its timeout.
    #[error("Request timeout")]
    Timeout,

    /// The server answered with a status outside 200..300.
    #[error("Request failed with status {}", .0.status)]
    Status(Box<Response>),

    /// The response body grew past the configured limit.
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
}

impl RequestError {
    /// The response attached to a failure-status error.
    pub fn response(&self) -> Option<&Response> {
        match self {
            RequestError::Status(response) => Some(response),
            _ => None,
        }
    }

    /// Consume the error, returning the attached response if there is one.
    pub fn into_response(self) -> Option<Response> {
        match self {
            RequestError::Status(response) => Some(*response),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Timeout)
    }

    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        RequestError::Transport(err.to_string())
    }
}
