use crate::app::{App, Middleware};
use crate::connection::Connection;
use crate::error::{AppResult, Error};
use async_trait::async_trait;
use regex::Regex;

/// Rewrites the request pathname with a regex before the downstream app sees it.
/// `$1`-style references in the replacement expand to captures.
#[derive(Debug, Clone)]
pub struct Rewrite {
    pattern: Regex,
    replacement: String,
}

impl Rewrite {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, Error> {
        let pattern = Regex::new(pattern).map_err(|e| Error::usage(format!("rewrite pattern {pattern:?}: {e}")))?;
        Ok(Self { pattern, replacement: replacement.into() })
    }
}

#[async_trait]
impl Middleware for Rewrite {
    async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult {
        let pathname = conn.location.pathname().unwrap_or("/");
        let rewritten = self.pattern.replace(pathname, self.replacement.as_str()).into_owned();
        conn.location.set_pathname(Some(&rewritten));
        next.call(conn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::MiddlewareExt;
    use crate::test_support::conn;
    use crate::{IntoReply, app_fn};
    use futures::FutureExt;
    use http::Method;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_rewrite_pathname() {
        let app = Rewrite::new(r"^/users/(\d+)$", "/profile/$1").unwrap().wrap(app_fn(|conn| {
            async move {
                let path = conn.location.path();
                Ok(path.into_reply())
            }
            .boxed()
        }));

        let mut conn = conn(Method::GET, "/users/7?tab=posts");
        conn.call(&app).await.unwrap();
        assert_eq!(conn.response.stringify_content(None, None).await.unwrap(), "/profile/7?tab=posts");
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(Rewrite::new("(", "/"), Err(Error::Usage { .. })));
    }
}
