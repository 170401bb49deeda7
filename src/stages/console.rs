//! Console logger.

use crate::http::{Request, Response};
use crate::pipeline::Logger;
use async_trait::async_trait;
use chrono::Local;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;
use tracing::warn;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Writes one timestamped line per notification:
///
/// ```text
/// 2024-03-05 14:07:09.120 GET /index.html HTTP/1.1 received.
/// 2024-03-05 14:07:09.121 Response: 200 OK.
/// 2024-03-05 14:07:09.122 Message: resource not found: x.
/// ```
pub struct ConsoleLogger<W = Stdout> {
    out: Mutex<W>,
}

impl ConsoleLogger<Stdout> {
    pub fn stdout() -> Self {
        Self::with_writer(tokio::io::stdout())
    }
}

impl Default for ConsoleLogger<Stdout> {
    fn default() -> Self {
        Self::stdout()
    }
}

impl<W> ConsoleLogger<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn with_writer(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    async fn write_line(&self, text: &str) {
        let line = format!("{} {}\n", Local::now().format(TIMESTAMP_FORMAT), text);
        let mut out = self.out.lock().await;

        let written = match out.write_all(line.as_bytes()).await {
            Ok(()) => out.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(error = %e, "Console logger write failed");
        }
    }
}

#[async_trait]
impl<W> Logger for ConsoleLogger<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn on_request(&self, request: &Request) {
        self.write_line(&format!(
            "{} {} {} received.",
            request.method(),
            request.route(),
            request.http_version()
        ))
        .await;
    }

    async fn on_response(&self, response: &Response) {
        let status = response.status();
        self.write_line(&format!(
            "Response: {} {}.",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        ))
        .await;
    }

    async fn on_message(&self, message: &str) {
        self.write_line(&format!("Message: {message}.")).await;
    }
}
