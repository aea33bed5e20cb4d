use crate::app::{App, Middleware};
use crate::connection::Connection;
use crate::error::AppResult;
use crate::reply::Reply;
use async_trait::async_trait;
use http::header::{self, HeaderValue};

/// Gives responses without a `Content-Type` a default one, `text/html` unless configured.
#[derive(Debug, Clone)]
pub struct ContentType {
    default: HeaderValue,
}

impl ContentType {
    pub fn new() -> Self {
        Self { default: HeaderValue::from_static("text/html") }
    }

    pub fn with_default(default: HeaderValue) -> Self {
        Self { default }
    }
}

impl Default for ContentType {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for ContentType {
    async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult {
        conn.call(next).await?;
        if !conn.response.has_header(header::CONTENT_TYPE) {
            conn.response.set_content_type(self.default.clone());
        }
        Ok(Reply::Unchanged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::MiddlewareExt;
    use crate::test_support::conn;
    use crate::{IntoReply, app_fn};
    use futures::FutureExt;
    use http::{Method, StatusCode};

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_default_only_when_missing() {
        let app = ContentType::new().wrap(StatusCode::OK);
        let mut plain = conn(Method::GET, "/");
        plain.call(&app).await.unwrap();
        assert_eq!(plain.response.header(header::CONTENT_TYPE), Some("text/html"));

        let json = ContentType::new().wrap(app_fn(|_conn| async move { Ok(serde_json::json!([]).into_reply()) }.boxed()));
        let mut conn = conn(Method::GET, "/");
        conn.call(&json).await.unwrap();
        assert_eq!(conn.response.header(header::CONTENT_TYPE), Some("application/json"));
    }
}
