//! Request decoding.
//!
//! Inbound frame:
//!
//! ```text
//! METHOD SP ROUTE SP VERSION CRLF
//! (NAME SP VALUE CRLF)*
//! CRLF
//! BODY
//! ```
//!
//! Header lines that do not split into exactly two space-separated tokens are
//! dropped, so multi-word header values are not representable.

use super::Headers;
use thiserror::Error;

/// Separator between the header block and the body.
pub const HEADER_TERMINATOR: &str = "\r\n\r\n";

/// Request decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The request line has fewer than three space-separated tokens.
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),
}

/// A decoded request. Read-only once constructed.
///
/// The default value is the *empty request*: every field is empty. Stages
/// must treat an empty route or version as a bad request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    headers: Headers,
    method: String,
    route: String,
    http_version: String,
    body: String,
}

impl Request {
    pub fn new(
        method: impl Into<String>,
        route: impl Into<String>,
        http_version: impl Into<String>,
    ) -> Self {
        Request {
            headers: Headers::new(),
            method: method.into(),
            route: route.into(),
            http_version: http_version.into(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Decode a request from the text received on a connection.
    ///
    /// Input that is blank or has no header terminator decodes to the empty
    /// request rather than an error.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        if raw.trim().is_empty() {
            return Ok(Request::default());
        }

        let Some((head, body)) = raw.split_once(HEADER_TERMINATOR) else {
            return Ok(Request::default());
        };

        let mut lines = head.split(['\r', '\n']).filter(|line| !line.is_empty());

        let Some(request_line) = lines.next() else {
            return Ok(Request::default());
        };

        let mut tokens = request_line.split(' ');
        let (method, route, http_version) = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(method), Some(route), Some(version)) => (method, route, version),
            _ => return Err(ParseError::MalformedRequestLine(request_line.to_string())),
        };

        let mut headers = Headers::new();
        for line in lines {
            let mut parts = line.split(' ');
            if let (Some(name), Some(value), None) = (parts.next(), parts.next(), parts.next()) {
                headers.insert(name, value);
            }
        }

        Ok(Request {
            headers,
            method: method.to_string(),
            route: route.to_string(),
            http_version: http_version.to_string(),
            body: body.to_string(),
        })
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn http_version(&self) -> &str {
        &self.http_version
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// True for the value produced from blank or unterminated input.
    pub fn is_empty(&self) -> bool {
        *self == Request::default()
    }
}
