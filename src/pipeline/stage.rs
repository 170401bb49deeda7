//! Pipeline stage contracts.

use super::ExecutorError;
use crate::http::{Request, Response};
use async_trait::async_trait;

/// Result of running one executor against a request.
///
/// `Ok(None)` means "not my route".
pub type ExecuteResult = Result<Option<Response>, ExecutorError>;

/// Inspects a request before any executor runs.
///
/// Returning `Some` rejects the request with that response.
pub trait Validator: Send + Sync {
    fn validate(&self, request: &Request) -> Option<Response>;
}

impl<F> Validator for F
where
    F: Fn(&Request) -> Option<Response> + Send + Sync,
{
    fn validate(&self, request: &Request) -> Option<Response> {
        self(request)
    }
}

/// Produces a response for the routes it recognises.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: &Request) -> ExecuteResult;
}

/// Side-effect-only observer of the request lifecycle.
///
/// Hooks cannot fail; implementations deal with their own I/O errors.
#[async_trait]
pub trait Logger: Send + Sync {
    async fn on_request(&self, _request: &Request) {}

    async fn on_response(&self, _response: &Response) {}

    async fn on_message(&self, _message: &str) {}
}
