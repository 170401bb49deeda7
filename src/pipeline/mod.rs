//! Ordered validator / executor / logger pipeline.
//!
//! Per request:
//! 1. every logger sees the request
//! 2. validators run in order; the first rejection ends processing
//! 3. executors run in order; the first response (or failure) wins
//! 4. every logger sees the response

mod error;
mod stage;

pub use error::ExecutorError;
pub use stage::{ExecuteResult, Executor, Logger, Validator};

use crate::http::{Request, Response};
use http::StatusCode;
use tracing::{debug, trace};

/// What the pipeline decided for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// An executor (or the not-found fallback) produced the response.
    Handled(Response),
    /// A validator rejected the request. The server stops accepting after
    /// sending this response.
    Rejected(Response),
}

impl Outcome {
    pub fn response(&self) -> &Response {
        match self {
            Outcome::Handled(response) | Outcome::Rejected(response) => response,
        }
    }
}

/// The registered stages, in registration order.
#[derive(Default)]
pub struct Pipeline {
    validators: Vec<Box<dyn Validator>>,
    executors: Vec<Box<dyn Executor>>,
    loggers: Vec<Box<dyn Logger>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_validator(&mut self, validator: Box<dyn Validator>) {
        self.validators.push(validator);
    }

    pub fn push_executor(&mut self, executor: Box<dyn Executor>) {
        self.executors.push(executor);
    }

    pub fn push_logger(&mut self, logger: Box<dyn Logger>) {
        self.loggers.push(logger);
    }

    /// Run one request through all stages.
    pub async fn process(&self, request: &Request) -> Outcome {
        self.log_request(request).await;

        if let Some(rejection) = self.validate(request) {
            debug!(status = rejection.status().as_u16(), "Request rejected by validator");
            return Outcome::Rejected(rejection);
        }

        let response = self.execute(request).await;
        self.log_response(&response).await;

        Outcome::Handled(response)
    }

    fn validate(&self, request: &Request) -> Option<Response> {
        self.validators.iter().find_map(|validator| validator.validate(request))
    }

    async fn execute(&self, request: &Request) -> Response {
        for (index, executor) in self.executors.iter().enumerate() {
            match executor.execute(request).await {
                Ok(Some(response)) => {
                    trace!(executor = index, status = response.status().as_u16(), "Route handled");
                    return response;
                }
                Ok(None) => continue,
                Err(e) => {
                    debug!(executor = index, error = %e, "Executor failed");
                    self.report(&e.to_string()).await;
                    return e.to_response();
                }
            }
        }

        Response::new(StatusCode::NOT_FOUND)
    }

    async fn log_request(&self, request: &Request) {
        for logger in &self.loggers {
            logger.on_request(request).await;
        }
    }

    /// Send a response to every logger's response hook.
    pub async fn log_response(&self, response: &Response) {
        for logger in &self.loggers {
            logger.on_response(response).await;
        }
    }

    /// Send a message to every logger's message hook.
    pub async fn report(&self, message: &str) {
        for logger in &self.loggers {
            logger.on_message(message).await;
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("validators", &self.validators.len())
            .field("executors", &self.executors.len())
            .field("loggers", &self.loggers.len())
            .finish()
    }
}

/// Recording stages shared by the pipeline and server tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Shared, ordered record of stage invocations.
    #[derive(Clone, Default)]
    pub struct Journal(Arc<Mutex<Vec<String>>>);

    impl Journal {
        pub fn push(&self, entry: impl Into<String>) {
            self.0.lock().unwrap().push(entry.into());
        }

        pub fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    pub struct Check {
        pub name: &'static str,
        pub reject_with: Option<StatusCode>,
        pub journal: Journal,
    }

    impl Validator for Check {
        fn validate(&self, _request: &Request) -> Option<Response> {
            self.journal.push(format!("validate:{}", self.name));
            self.reject_with.map(Response::new)
        }
    }

    pub enum Behaviour {
        Pass,
        Respond(StatusCode, &'static str),
        Fail(fn() -> ExecutorError),
    }

    pub struct Route {
        pub name: &'static str,
        pub behaviour: Behaviour,
        pub journal: Journal,
    }

    #[async_trait]
    impl Executor for Route {
        async fn execute(&self, _request: &Request) -> ExecuteResult {
            self.journal.push(format!("execute:{}", self.name));
            match &self.behaviour {
                Behaviour::Pass => Ok(None),
                Behaviour::Respond(status, body) => Ok(Some(Response::with_body(*status, *body))),
                Behaviour::Fail(make) => Err(make()),
            }
        }
    }

    pub struct Recorder {
        pub name: &'static str,
        pub journal: Journal,
    }

    #[async_trait]
    impl Logger for Recorder {
        async fn on_request(&self, request: &Request) {
            self.journal.push(format!("{}:request:{}", self.name, request.route()));
        }

        async fn on_response(&self, response: &Response) {
            self.journal.push(format!("{}:response:{}", self.name, response.status().as_u16()));
        }

        async fn on_message(&self, message: &str) {
            self.journal.push(format!("{}:message:{}", self.name, message));
        }
    }
}
