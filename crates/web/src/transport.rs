//! Adapter between a transport's `http` types and the app chain.
//!
//! Socket handling stays with the transport: it hands over each parsed request, writes the
//! returned response and reports an early close through [`Connection::close_handle`].

use crate::app::{App, BoxApp};
use crate::connection::{Connection, Environment};
use crate::error::Interrupt;
use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use mach_http::Content;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};

pub struct TransportBuilder {
    app: Option<BoxApp>,
    environment: Environment,
}

impl TransportBuilder {
    fn new() -> Self {
        Self { app: None, environment: Environment::default() }
    }

    pub fn app(mut self, app: impl App + 'static) -> Self {
        self.app = Some(Arc::new(app));
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn build(self) -> Result<Transport, TransportBuildError> {
        let app = self.app.ok_or(TransportBuildError::MissingApp)?;
        Ok(Transport { app, environment: self.environment })
    }
}

#[derive(Error, Debug)]
pub enum TransportBuildError {
    #[error("app must be set")]
    MissingApp,
}

pub struct Transport {
    app: BoxApp,
    environment: Environment,
}

impl Transport {
    pub fn builder() -> TransportBuilder {
        TransportBuilder::new()
    }

    /// Creates the connection for one inbound request.
    pub fn connection<B>(&self, request: Request<B>, remote_addr: Option<SocketAddr>) -> Connection
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        Connection::from_request(request, remote_addr, &self.environment)
    }

    /// Runs the app chain to completion. Uncaught errors become a `500`, an uncaught halt is
    /// applied as if it had been caught.
    pub async fn run(&self, mut conn: Connection) -> Response<Content> {
        match conn.call(self.app.as_ref()).await {
            Ok(()) => {}
            Err(Interrupt::Halt(reply)) => {
                warn!(method = %conn.method, path = %conn.location.path(), "halt signal reached the transport");
                conn.apply(reply);
            }
            Err(Interrupt::Error(e)) => {
                error!(cause = %e, method = %conn.method, path = %conn.location.path(), "app failed");
                internal_error(&mut conn);
            }
        }

        let is_head = conn.method == Method::HEAD;
        let mut response = conn.into_response();

        if !response.headers().contains_key(header::CONTENT_LENGTH) {
            if let Some(length) = response.body().length() {
                response.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            }
        }
        if is_head {
            *response.body_mut() = Content::empty();
        }
        response
    }

    pub async fn handle<B>(&self, request: Request<B>, remote_addr: Option<SocketAddr>) -> Response<Content>
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        self.run(self.connection(request, remote_addr)).await
    }
}

impl std::fmt::Debug for TransportBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBuilder")
            .field("app", &self.app.is_some())
            .field("environment", &self.environment)
            .finish()
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").field("environment", &self.environment).finish_non_exhaustive()
    }
}

fn internal_error(conn: &mut Connection) {
    conn.response = mach_http::Message::new();
    conn.text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_fn;
    use crate::error::Error;
    use crate::reply::IntoReply;
    use crate::test_support::request;
    use futures::FutureExt;
    use http_body_util::BodyExt;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_error_maps_to_500() {
        let transport = Transport::builder()
            .app(app_fn(|_conn| async move { Err(Error::usage("missing session middleware").into()) }.boxed()))
            .build()
            .unwrap();

        let response = transport.handle(request(Method::GET, "/"), None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from("Internal Server Error"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_uncaught_halt_is_applied() {
        let transport = Transport::builder()
            .app(app_fn(|_conn| async move { Err(Interrupt::halt((StatusCode::FORBIDDEN, "no"))) }.boxed()))
            .build()
            .unwrap();

        let response = transport.handle(request(Method::GET, "/"), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_head_drops_content() {
        let transport =
            Transport::builder().app(app_fn(|_conn| async move { Ok("hello".into_reply()) }.boxed())).build().unwrap();

        let response = transport.handle(request(Method::HEAD, "/"), None).await;
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "5");
        assert!(response.into_body().collect().await.unwrap().to_bytes().is_empty());
    }

    #[test]
    fn test_builder_requires_app() {
        assert!(matches!(Transport::builder().build(), Err(TransportBuildError::MissingApp)));
    }
}
