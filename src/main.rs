//! tiny-httpd: serve static files through a validator/executor/logger pipeline.
//!
//! Features:
//! - Method whitelisting (405 for anything else)
//! - Case-insensitive static file lookup under a web root
//! - Console or tracing request logging
//! - Configuration via CLI arguments or TOML file

use tiny_httpd::config::{Config, LogSink};
use tiny_httpd::stages::{ConsoleLogger, MethodValidator, StaticFileExecutor, TracingLogger};
use tiny_httpd::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        web_root = %config.web_root.display(),
        default_page = %config.default_page,
        allowed_methods = ?config.allowed_methods,
        sink = ?config.log_sink,
        "Starting tiny-httpd server"
    );

    let server = Server::bind_with(config.listen, config.options.clone())?
        .add_validator(MethodValidator::new(config.allowed_methods.clone()))
        .add_executor(
            StaticFileExecutor::new(&config.web_root).with_default_page(&config.default_page),
        );

    let mut server = match config.log_sink {
        LogSink::Console => server.add_logger(ConsoleLogger::stdout()),
        LogSink::Tracing => server.add_logger(TracingLogger),
    };

    let handle = server.handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping");
                handle.stop();
            }
            Err(e) => error!(error = %e, "Failed to listen for interrupt"),
        }
    });

    let reason = server.start().await?;
    info!(?reason, "Server exited");

    Ok(())
}
