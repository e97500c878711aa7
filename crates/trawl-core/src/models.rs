use std::fmt;

use crate::headers::Headers;

/// Response as handed back by a transport, before any classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// URL after redirects.
    pub final_url: String,
    /// `None` when the transport could not determine a status.
    pub status: Option<u16>,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// A `200 OK` HTML response, mostly useful for tests and mocks.
    pub fn html(url: impl Into<String>, body: impl Into<String>) -> Self {
        let mut headers = Headers::new();
        headers.insert("content-type", "text/html; charset=utf-8");
        Self {
            final_url: url.into(),
            status: Some(200),
            headers,
            body: body.into().into_bytes(),
        }
    }

    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Coarse cause of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request exceeded its timeout.
    Timeout,
    /// The host name could not be resolved.
    HostNotFound,
    /// Anything else: refused connections, TLS failures, bad URLs...
    Other,
}

/// Transport-level failure (no HTTP response was obtained).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(TransportErrorKind::Timeout, "operation timed out")
    }

    pub fn host_not_found(host: &str) -> Self {
        Self::new(
            TransportErrorKind::HostNotFound,
            format!("failed to lookup address for {host}"),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportError {}
