//! Static file executor.
//!
//! Maps a route to a file directly under the web root. The file name match is
//! case-insensitive and `/` maps to the default page. Nested paths never
//! match since only the root directory's own entries are considered.

use crate::http::{Request, Response};
use crate::pipeline::{ExecuteResult, Executor};
use async_trait::async_trait;
use http::StatusCode;
use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Page served for `/`
pub const DEFAULT_PAGE: &str = "index.html";

pub struct StaticFileExecutor {
    root: PathBuf,
    default_page: String,
}

impl StaticFileExecutor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            default_page: DEFAULT_PAGE.to_string(),
        }
    }

    pub fn with_default_page(mut self, name: impl Into<String>) -> Self {
        self.default_page = name.into();
        self
    }

    /// Find a regular file in the root whose name equals `name`, ignoring case.
    ///
    /// When several names differ only in case, whichever the directory
    /// listing yields first is used.
    async fn find(&self, name: &str) -> io::Result<Option<PathBuf>> {
        let wanted = name.to_lowercase();
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().to_lowercase() != wanted {
                continue;
            }
            let path = entry.path();
            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false);
            if is_file {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    fn content_type(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase()
            .as_str()
        {
            "html" | "htm" => "text/html;charset=UTF-8",
            "css" => "text/css;charset=UTF-8",
            "js" => "application/javascript;charset=UTF-8",
            "json" => "application/json",
            "txt" => "text/plain;charset=UTF-8",
            _ => "application/octet-stream",
        }
    }
}

#[async_trait]
impl Executor for StaticFileExecutor {
    async fn execute(&self, request: &Request) -> ExecuteResult {
        if request.route().trim().is_empty() || request.http_version().trim().is_empty() {
            return Ok(Some(Response::new(StatusCode::BAD_REQUEST)));
        }

        let name = if request.route() == "/" {
            self.default_page.as_str()
        } else {
            let mut chars = request.route().chars();
            chars.next();
            chars.as_str()
        };

        let Some(path) = self.find(name).await? else {
            trace!(route = request.route(), "No matching file");
            return Ok(None);
        };

        let content = tokio::fs::read_to_string(&path).await?;
        Ok(Some(
            Response::with_body(StatusCode::OK, content)
                .header("Content-Type", Self::content_type(&path)),
        ))
    }
}
