//! Logger that forwards pipeline notifications to `tracing`.

use crate::http::{Request, Response};
use crate::pipeline::Logger;
use async_trait::async_trait;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

#[async_trait]
impl Logger for TracingLogger {
    async fn on_request(&self, request: &Request) {
        info!(
            method = request.method(),
            route = request.route(),
            version = request.http_version(),
            "Request received"
        );
    }

    async fn on_response(&self, response: &Response) {
        info!(
            status = response.status().as_u16(),
            bytes = response.body().len(),
            "Response sent"
        );
    }

    async fn on_message(&self, message: &str) {
        warn!(detail = message, "Pipeline message");
    }
}
