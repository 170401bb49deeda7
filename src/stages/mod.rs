//! Stock pipeline stages.
//!
//! - `method`: reject requests whose method is not allowed (405)
//! - `static_files`: serve files from a directory
//! - `console`: timestamped request/response lines on an output stream
//! - `events`: forward pipeline notifications to `tracing`

pub mod console;
pub mod events;
pub mod method;
pub mod static_files;

pub use console::ConsoleLogger;
pub use events::TracingLogger;
pub use method::MethodValidator;
pub use static_files::StaticFileExecutor;
