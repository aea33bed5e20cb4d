use super::is_textual;
use crate::app::{App, Middleware};
use crate::connection::Connection;
use crate::error::AppResult;
use crate::reply::Reply;
use async_trait::async_trait;
use http::header::HeaderValue;

/// Declares a charset, `utf-8` by default, on textual responses whose `Content-Type` has none.
#[derive(Debug, Clone)]
pub struct Charset {
    charset: String,
}

impl Charset {
    pub fn new() -> Self {
        Self::with_charset("utf-8")
    }

    pub fn with_charset(charset: impl Into<String>) -> Self {
        Self { charset: charset.into() }
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for Charset {
    async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult {
        conn.call(next).await?;

        let Some(mut content_type) = conn.response.content_type() else {
            return Ok(Reply::Unchanged);
        };
        let textual = conn.response.media_type().is_some_and(|media_type| is_textual(&media_type));
        if textual && content_type.param("charset").is_none() {
            content_type.set_param("charset", self.charset.as_str());
            if let Ok(value) = HeaderValue::from_str(&content_type.stringify('/')) {
                conn.response.set_content_type(value);
            }
        }
        Ok(Reply::Unchanged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::MiddlewareExt;
    use crate::test_support::conn;
    use crate::{ReplyParts, IntoReply, app_fn};
    use futures::FutureExt;
    use http::{Method, header};

    fn typed(content_type: &'static str) -> impl App {
        app_fn(move |_conn| {
            async move {
                Ok(ReplyParts::new().header(header::CONTENT_TYPE, HeaderValue::from_static(content_type)).into_reply())
            }
            .boxed()
        })
    }

    async fn content_type_after(content_type: &'static str) -> Option<String> {
        let app = Charset::new().wrap(typed(content_type));
        let mut conn = conn(Method::GET, "/");
        conn.call(&app).await.unwrap();
        conn.response.header(header::CONTENT_TYPE).map(str::to_owned)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_appends_to_textual_types() {
        assert_eq!(content_type_after("text/html").await.as_deref(), Some("text/html;charset=utf-8"));
        assert_eq!(content_type_after("application/json").await.as_deref(), Some("application/json;charset=utf-8"));
        assert_eq!(content_type_after("text/plain; charset=latin1").await.as_deref(), Some("text/plain; charset=latin1"));
        assert_eq!(content_type_after("image/png").await.as_deref(), Some("image/png"));
    }
}
