//! Response value and wire encoding.
//!
//! Outbound frame:
//!
//! ```text
//! HTTP/1.1 SP CODE SP REASON CRLF
//! Date: <IMF-fixdate> CRLF
//! (Name: Value CRLF)*
//! CRLF
//! BODY CRLF
//! ```

use super::Headers;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use http::StatusCode;

/// Content type used when a response is built without explicit headers.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html;charset=UTF-8";

/// `Date` header format (RFC 9110 IMF-fixdate).
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// A response produced by a validator or an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: String,
}

impl Response {
    /// Empty-bodied response with the default headers.
    pub fn new(status: StatusCode) -> Self {
        Self::with_parts(status, None, None)
    }

    pub fn with_body(status: StatusCode, body: impl Into<String>) -> Self {
        Self::with_parts(status, Some(body.into()), None)
    }

    /// Build a response from optional parts.
    ///
    /// Missing headers become a single `Content-Type` entry and a missing
    /// body becomes the empty string.
    pub fn with_parts(status: StatusCode, body: Option<String>, headers: Option<Headers>) -> Self {
        let headers = headers.unwrap_or_else(|| {
            let mut defaults = Headers::new();
            defaults.insert("Content-Type", DEFAULT_CONTENT_TYPE);
            defaults
        });

        Response {
            status,
            headers,
            body: body.unwrap_or_default(),
        }
    }

    /// Set a header, replacing any existing value with the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Encode the response stamped with the current time.
    pub fn encode(&self) -> BytesMut {
        self.encode_at(Utc::now())
    }

    /// Encode the response with a fixed `Date` value.
    pub fn encode_at(&self, date: DateTime<Utc>) -> BytesMut {
        let reason = self.status.canonical_reason().unwrap_or("Unknown");
        let date = date.format(DATE_FORMAT).to_string();

        let mut out = BytesMut::with_capacity(128 + self.body.len());
        out.extend_from_slice(format!("HTTP/1.1 {} {}\r\n", self.status.as_u16(), reason).as_bytes());
        out.extend_from_slice(format!("Date: {date}\r\n").as_bytes());
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(self.body.as_bytes());
        out.extend_from_slice(b"\r\n");
        out
    }
}
