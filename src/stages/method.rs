//! Method whitelist validator.

use crate::http::{Request, Response};
use crate::pipeline::Validator;
use http::{Method, StatusCode};

/// Rejects any request whose method is not in the allowed set.
///
/// Methods are compared ASCII case-insensitively. Rejections carry an
/// `Allow` header listing the accepted methods.
#[derive(Debug, Clone)]
pub struct MethodValidator {
    allowed: Vec<Method>,
}

impl MethodValidator {
    pub fn new(allowed: impl IntoIterator<Item = Method>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn allows(&self, method: &str) -> bool {
        self.allowed
            .iter()
            .any(|allowed| allowed.as_str().eq_ignore_ascii_case(method))
    }
}

impl Validator for MethodValidator {
    fn validate(&self, request: &Request) -> Option<Response> {
        if self.allows(request.method()) {
            return None;
        }

        let allow = self
            .allowed
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Some(Response::new(StatusCode::METHOD_NOT_ALLOWED).header("Allow", allow))
    }
}
