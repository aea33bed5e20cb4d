//! Forwarding requests to an upstream server.

use crate::app::{App, Middleware};
use crate::connection::{Aborted, Connection};
use crate::error::{AppResult, BoxError, Error};
use crate::reply::{IntoReply, Reply, ReplyParts};
use async_trait::async_trait;
use futures::TryStreamExt;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Request, Response, StatusCode};
use mach_http::{Content, Location, LocationOptions};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Headers scoped to a single transport hop, never forwarded in either direction.
static HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream timed out")]
    Timeout,

    #[error("upstream transport error: {source}")]
    Transport { source: BoxError },

    #[error("invalid upstream message: {source}")]
    Http {
        #[from]
        source: http::Error,
    },
}

impl UpstreamError {
    pub fn transport<E: Into<BoxError>>(e: E) -> Self {
        Self::Transport { source: e.into() }
    }
}

impl From<UpstreamError> for Error {
    fn from(e: UpstreamError) -> Self {
        Error::upstream(e)
    }
}

/// The server a [`Proxy`] forwards to.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, request: Request<Content>) -> Result<Response<Content>, UpstreamError>;
}

#[async_trait]
impl<U: Upstream + ?Sized> Upstream for Arc<U> {
    async fn send(&self, request: Request<Content>) -> Result<Response<Content>, UpstreamError> {
        self.as_ref().send(request).await
    }
}

/// An [`Upstream`] speaking HTTP through a pooled `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(UpstreamError::transport)?;
        Ok(Self { client })
    }
}

fn upstream_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() { UpstreamError::Timeout } else { UpstreamError::transport(e) }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn send(&self, request: Request<Content>) -> Result<Response<Content>, UpstreamError> {
        let (parts, content) = request.into_parts();
        let body = content.buffer(None).await.map_err(UpstreamError::transport)?;

        let response = self
            .client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(body)
            .send()
            .await
            .map_err(upstream_error)?;

        let mut builder = Response::builder().status(response.status()).version(response.version());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(response.headers().clone());
        }
        let stream = response.bytes_stream().map_err(upstream_error);
        Ok(builder.body(Content::stream(stream))?)
    }
}

type Filter = dyn Fn(&Connection) -> bool + Send + Sync;

/// Forwards requests to `target`, the request path below the connection's basename joined
/// onto the target's pathname.
///
/// Unreachable upstreams are answered with `502`, timeouts with `504`. When the connection
/// closes before the upstream answers the forwarded request is dropped and the reply is left
/// unchanged.
pub struct Proxy<U> {
    target: Location,
    upstream: U,
    filter: Option<Box<Filter>>,
}

impl<U: Upstream> Proxy<U> {
    pub fn new(target: Location, upstream: U) -> Self {
        Self { target, upstream, filter: None }
    }

    /// Only forwards connections matching `filter`, others go to the downstream app.
    pub fn when<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Connection) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    fn target_for(&self, conn: &Connection) -> Location {
        self.target.concat(&LocationOptions::new().path(conn.path()).build())
    }
}

impl Proxy<HttpUpstream> {
    pub fn http(target: &str) -> Result<Self, Error> {
        Ok(Self::new(Location::parse(target)?, HttpUpstream::new()))
    }
}

impl<U> fmt::Debug for Proxy<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy").field("target", &self.target.href()).finish_non_exhaustive()
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

#[async_trait]
impl<U: Upstream> Middleware for Proxy<U> {
    async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult {
        if self.filter.as_ref().is_some_and(|filter| !filter(conn)) {
            return next.call(conn).await;
        }

        let target = self.target_for(conn);
        let href = target.href();

        let mut headers = conn.request.headers().clone();
        strip_hop_by_hop(&mut headers);
        if let Some(host) = target.host() {
            headers.insert(header::HOST, HeaderValue::try_from(host).map_err(http::Error::from)?);
        }

        let mut request = Request::builder().method(conn.method.clone()).uri(href.as_str());
        if let Some(request_headers) = request.headers_mut() {
            *request_headers = headers;
        }
        let request = request.body(conn.request.take_content())?;

        let response = match conn.abort_scope().run(self.upstream.send(request)).await {
            Ok(response) => response,
            Err(Aborted) => {
                info!(target = %href, "proxy request aborted");
                return Ok(Reply::Unchanged);
            }
        };

        match response {
            Ok(response) => {
                let (mut parts, content) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Ok(Reply::Full(ReplyParts { status: Some(parts.status), headers: parts.headers, content: Some(content) }))
            }
            Err(UpstreamError::Timeout) => {
                warn!(target = %href, "proxy upstream timed out");
                Ok(StatusCode::GATEWAY_TIMEOUT.into_reply())
            }
            Err(e) => {
                warn!(cause = %e, target = %href, "proxy upstream failed");
                Ok(StatusCode::BAD_GATEWAY.into_reply())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::MiddlewareExt;
    use crate::test_support::{conn, conn_with, request};
    use http::Method;

    /// Echoes the forwarded uri and host, and a hop-by-hop header to be stripped.
    struct Echo;

    #[async_trait]
    impl Upstream for Echo {
        async fn send(&self, request: Request<Content>) -> Result<Response<Content>, UpstreamError> {
            let host = request.headers().get(header::HOST).and_then(|v| v.to_str().ok()).unwrap_or_default().to_owned();
            let forwarded_connection = request.headers().contains_key(header::CONNECTION);
            let body = request.into_body().buffer(None).await.map_err(UpstreamError::transport)?;
            let text = format!("{host} {forwarded_connection} {}", String::from_utf8_lossy(&body));
            Ok(Response::builder()
                .status(StatusCode::CREATED)
                .header(header::CONNECTION, "close")
                .header("x-upstream", "echo")
                .body(Content::from(text))?)
        }
    }

    struct Recorder(std::sync::Mutex<Vec<String>>);

    #[async_trait]
    impl Upstream for Recorder {
        async fn send(&self, request: Request<Content>) -> Result<Response<Content>, UpstreamError> {
            self.0.lock().unwrap().push(request.uri().to_string());
            Ok(Response::new(Content::empty()))
        }
    }

    struct Failing(bool);

    #[async_trait]
    impl Upstream for Failing {
        async fn send(&self, _request: Request<Content>) -> Result<Response<Content>, UpstreamError> {
            if self.0 { Err(UpstreamError::Timeout) } else { Err(UpstreamError::transport("connection refused")) }
        }
    }

    struct Pending;

    #[async_trait]
    impl Upstream for Pending {
        async fn send(&self, _request: Request<Content>) -> Result<Response<Content>, UpstreamError> {
            std::future::pending().await
        }
    }

    fn target() -> Location {
        Location::parse("http://backend.internal:8080/api?key=1").unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_forwards_request_and_response() {
        let app = Proxy::new(target(), Echo).wrap(StatusCode::NOT_FOUND);
        let mut req = request(Method::POST, "/users?page=2");
        req.headers_mut().insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        *req.body_mut() = Content::from("payload");
        let mut conn = conn_with(req);
        conn.call(&app).await.unwrap();

        assert_eq!(conn.status, StatusCode::CREATED);
        assert_eq!(conn.response.header("x-upstream"), Some("echo"));
        assert!(!conn.response.has_header(header::CONNECTION));
        assert_eq!(
            conn.response.stringify_content(None, None).await.unwrap(),
            "backend.internal:8080 false payload"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_target_joins_path_below_basename() {
        let recorder = Arc::new(Recorder(std::sync::Mutex::new(vec![])));
        let app = Proxy::new(target(), recorder.clone()).wrap(StatusCode::NOT_FOUND);
        let mut conn = conn(Method::GET, "/mounted/users?page=2");
        conn.basename = "/mounted".into();
        conn.call(&app).await.unwrap();

        let uris = recorder.0.lock().unwrap().clone();
        assert_eq!(uris, vec!["http://backend.internal:8080/api/users?key=1&page=2".to_owned()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_secure_target_keeps_standard_port() {
        let secure = || Location::parse("https://secure.example.com/v1").unwrap();
        let inbound = || {
            let mut req = request(Method::GET, "/users");
            req.headers_mut().insert(header::HOST, HeaderValue::from_static("localhost:3000"));
            conn_with(req)
        };

        let recorder = Arc::new(Recorder(std::sync::Mutex::new(vec![])));
        let mut conn = inbound();
        assert_eq!(conn.location.port(), Some("3000"));
        conn.call(&Proxy::new(secure(), recorder.clone()).wrap(StatusCode::NOT_FOUND)).await.unwrap();
        assert_eq!(recorder.0.lock().unwrap().clone(), vec!["https://secure.example.com/v1/users".to_owned()]);

        let mut conn = inbound();
        conn.call(&Proxy::new(secure(), Echo).wrap(StatusCode::NOT_FOUND)).await.unwrap();
        assert_eq!(conn.response.stringify_content(None, None).await.unwrap(), "secure.example.com false ");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_upstream_failures_map_to_gateway_statuses() {
        let mut refused = conn(Method::GET, "/");
        refused.call(&Proxy::new(target(), Failing(false)).wrap(StatusCode::OK)).await.unwrap();
        assert_eq!(refused.status, StatusCode::BAD_GATEWAY);

        let mut timed_out = conn(Method::GET, "/");
        timed_out.call(&Proxy::new(target(), Failing(true)).wrap(StatusCode::OK)).await.unwrap();
        assert_eq!(timed_out.status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_close_aborts_pending_upstream() {
        let app = Proxy::new(target(), Pending).wrap(StatusCode::NOT_FOUND);
        let mut conn = conn(Method::GET, "/slow");
        let close = conn.close_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            close.close();
        });

        conn.call(&app).await.unwrap();
        assert!(conn.is_closed());
        assert_eq!(conn.status, StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_filter_falls_through() {
        let app = Proxy::new(target(), Failing(false))
            .when(|conn| conn.pathname().starts_with("/api"))
            .wrap(StatusCode::NO_CONTENT);
        let mut conn = conn(Method::GET, "/home");
        conn.call(&app).await.unwrap();
        assert_eq!(conn.status, StatusCode::NO_CONTENT);
    }
}
