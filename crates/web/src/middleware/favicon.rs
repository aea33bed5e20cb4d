use crate::app::{App, Middleware};
use crate::connection::Connection;
use crate::error::AppResult;
use crate::reply::{IntoReply, ReplyParts};
use async_trait::async_trait;
use http::header::{self, HeaderValue};
use http::StatusCode;
use std::path::PathBuf;

/// Answers `/favicon.ico` from a file, or with `404` when none is configured.
#[derive(Debug, Clone, Default)]
pub struct Favicon {
    path: Option<PathBuf>,
}

impl Favicon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

#[async_trait]
impl Middleware for Favicon {
    async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult {
        if conn.pathname() != "/favicon.ico" {
            return next.call(conn).await;
        }
        let Some(path) = &self.path else {
            return Ok(StatusCode::NOT_FOUND.into_reply());
        };

        let icon = tokio::fs::read(path).await?;
        Ok(ReplyParts::new()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, HeaderValue::from_static("image/x-icon"))
            .content(icon)
            .into_reply())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::MiddlewareExt;
    use crate::test_support::conn;
    use http::Method;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_without_icon() {
        let app = Favicon::new().wrap(StatusCode::OK);

        let mut icon = conn(Method::GET, "/favicon.ico");
        icon.call(&app).await.unwrap();
        assert_eq!(icon.status, StatusCode::NOT_FOUND);

        let mut page = conn(Method::GET, "/index.html");
        page.call(&app).await.unwrap();
        assert_eq!(page.status, StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_with_icon() {
        let path = std::env::temp_dir().join(format!("mach-favicon-test-{}.ico", std::process::id()));
        tokio::fs::write(&path, b"icon").await.unwrap();

        let app = Favicon::new().path(&path).wrap(StatusCode::OK);
        let mut conn = conn(Method::GET, "/favicon.ico");
        conn.call(&app).await.unwrap();

        assert_eq!(conn.response.header(header::CONTENT_TYPE), Some("image/x-icon"));
        assert_eq!(conn.response.content().length(), Some(4));
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
