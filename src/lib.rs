//! tiny-httpd: a minimal HTTP server built around a request pipeline.
//!
//! Each accepted connection carries exactly one request:
//! - the raw bytes are decoded into a [`Request`]
//! - loggers are notified, validators may reject, executors produce a
//!   [`Response`]
//! - the response is encoded, written, and the connection closed
//!
//! A validator rejection stops the server from accepting further
//! connections. There is no keep-alive, pipelining, chunked encoding or TLS.

pub mod config;
pub mod http;
pub mod pipeline;
pub mod server;
pub mod stages;

pub use crate::http::{Headers, ParseError, Request, Response};
pub use pipeline::{ExecuteResult, Executor, ExecutorError, Logger, Outcome, Pipeline, Validator};
pub use server::{Server, ServerError, ServerHandle, ServerOptions, ServerState, Shutdown};
