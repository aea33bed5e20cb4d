use crate::app::{App, Middleware};
use crate::connection::Connection;
use crate::error::{AppResult, Interrupt};
use async_trait::async_trait;

/// Turns a [`Interrupt::Halt`] raised downstream into a regular reply. Errors pass through.
#[derive(Debug, Clone, Copy, Default)]
pub struct Catch;

impl Catch {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for Catch {
    async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult {
        match next.call(conn).await {
            Err(Interrupt::Halt(reply)) => Ok(reply),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::MiddlewareExt;
    use crate::error::Error;
    use crate::test_support::conn;
    use crate::{IntoReply, app_fn};
    use futures::FutureExt;
    use http::{Method, StatusCode};

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_halt_becomes_reply() {
        let app = Catch::new().wrap(app_fn(|_conn| {
            async move { Err(Interrupt::halt((StatusCode::UNAUTHORIZED, "stop"))) }.boxed()
        }));

        let mut conn = conn(Method::GET, "/");
        conn.call(&app).await.unwrap();
        assert_eq!(conn.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_errors_keep_propagating() {
        let app = Catch::new().wrap(app_fn(|_conn| async move { Err(Error::usage("broken").into()) }.boxed()));

        let mut conn = conn(Method::GET, "/");
        let result = conn.call(&app).await;
        assert!(matches!(result, Err(Interrupt::Error(Error::Usage { .. }))));

        let ok = Catch::new().wrap(app_fn(|_conn| async move { Ok(StatusCode::ACCEPTED.into_reply()) }.boxed()));
        conn.call(&ok).await.unwrap();
        assert_eq!(conn.status, StatusCode::ACCEPTED);
    }
}
