//! Configuration module for the tiny-httpd server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::server::ServerOptions;
use clap::Parser;
use http::Method;
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "tiny-httpd")]
#[command(author = "tiny-httpd authors")]
#[command(version = "0.1.0")]
#[command(about = "A minimal pipeline-driven HTTP server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:8080)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Directory static files are served from
    #[arg(short = 'r', long)]
    pub web_root: Option<PathBuf>,

    /// Accepted HTTP method; repeat to allow several
    #[arg(short = 'm', long = "allow-method")]
    pub allow_methods: Vec<String>,

    /// File served for `/`
    #[arg(long)]
    pub default_page: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Socket-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Bytes read per connection (defaults to the socket receive buffer size)
    pub read_buffer_size: Option<usize>,
    pub read_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backlog: default_backlog(),
            read_buffer_size: None,
            read_timeout_ms: None,
            write_timeout_ms: None,
        }
    }
}

/// Request handling configuration
#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: Vec<String>,
    #[serde(default = "default_web_root")]
    pub web_root: PathBuf,
    #[serde(default = "default_page")]
    pub default_page: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            allowed_methods: default_allowed_methods(),
            web_root: default_web_root(),
            default_page: default_page(),
        }
    }
}

/// Which pipeline logger the bootstrap registers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSink {
    /// Timestamped lines on stdout
    #[default]
    Console,
    /// Events through the tracing subscriber
    Tracing,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub sink: LogSink,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            sink: LogSink::default(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_backlog() -> u32 {
    128
}

fn default_allowed_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

fn default_web_root() -> PathBuf {
    PathBuf::from("webroot")
}

fn default_page() -> String {
    "index.html".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub options: ServerOptions,
    pub allowed_methods: Vec<Method>,
    pub web_root: PathBuf,
    pub default_page: String,
    pub log_level: String,
    pub log_sink: LogSink,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence)
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let TomlConfig {
            server,
            http,
            logging,
        } = toml_config;

        let listen = cli.listen.unwrap_or(server.listen);
        let listen = listen
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidListen(listen.clone(), e))?;

        let method_names = if cli.allow_methods.is_empty() {
            http.allowed_methods
        } else {
            cli.allow_methods
        };
        let allowed_methods = method_names
            .iter()
            .map(|name| parse_method(name))
            .collect::<Result<Vec<_>, _>>()?;

        let options = ServerOptions {
            backlog: server.backlog,
            read_buffer_size: server.read_buffer_size,
            read_timeout: server.read_timeout_ms.map(Duration::from_millis),
            write_timeout: server.write_timeout_ms.map(Duration::from_millis),
        };

        Ok(Config {
            listen,
            options,
            allowed_methods,
            web_root: cli.web_root.unwrap_or(http.web_root),
            default_page: cli.default_page.unwrap_or(http.default_page),
            log_level: cli.log_level.unwrap_or(logging.level),
            log_sink: logging.sink,
        })
    }
}

fn parse_method(name: &str) -> Result<Method, ConfigError> {
    Method::from_bytes(name.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| ConfigError::InvalidMethod(name.to_string()))
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, std::io::Error),

    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, toml::de::Error),

    #[error("Invalid listen address '{0}': {1}")]
    InvalidListen(String, AddrParseError),

    #[error("Invalid HTTP method '{0}'")]
    InvalidMethod(String),
}
