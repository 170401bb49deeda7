//! Executor failure kinds and their status mapping.

use crate::http::Response;
use http::StatusCode;
use std::io;
use thiserror::Error;

/// Failures an executor may report instead of a response.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// A resource the executor expected is missing. Answered with 403.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// An index or structural lookup went out of range. Answered with 417.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Access to a resource was denied. Answered with 401.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Anything else. Answered with 500.
    #[error("{0}")]
    Other(String),
}

impl ExecutorError {
    pub fn status(&self) -> StatusCode {
        match self {
            ExecutorError::NotFound(_) => StatusCode::FORBIDDEN,
            ExecutorError::OutOfRange(_) => StatusCode::EXPECTATION_FAILED,
            ExecutorError::AccessDenied(_) => StatusCode::UNAUTHORIZED,
            ExecutorError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The response sent in place of the failed executor's output.
    pub fn to_response(&self) -> Response {
        Response::new(self.status())
    }
}

impl From<io::Error> for ExecutorError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => ExecutorError::NotFound(e.to_string()),
            io::ErrorKind::PermissionDenied => ExecutorError::AccessDenied(e.to_string()),
            _ => ExecutorError::Other(e.to_string()),
        }
    }
}
