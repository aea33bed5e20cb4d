//! The per-request container coupling a request and a response message.

use crate::app::App;
use crate::error::Interrupt;
use crate::middleware::session::Session;
use crate::reply::{IntoReply, Reply};
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, StatusCode, Version};
use mach_http::{Content, Location, LocationOptions, Message, Params, standard_port};
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Transport defaults used when the request carries no host information.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Environment {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl Default for Environment {
    fn default() -> Self {
        Self { protocol: "http:".into(), host: "localhost".into(), port: 80 }
    }
}

pub struct Connection {
    pub request: Message,
    pub response: Message,
    pub status: StatusCode,
    pub method: Method,
    pub version: Version,
    pub location: Location,
    pub remote_addr: Option<SocketAddr>,
    /// Set by the params middleware or by a matching route.
    pub params: Option<Params>,
    /// Set by the session middleware.
    pub session: Option<Session>,
    /// Set by the basic auth middleware.
    pub remote_user: Option<String>,
    /// The part of the pathname consumed by enclosing mappings.
    pub basename: String,
    close: CloseHandle,
}

impl Connection {
    pub fn new(method: Method, location: Location, request: Message) -> Self {
        Self {
            request,
            response: Message::new(),
            status: StatusCode::OK,
            method,
            version: Version::HTTP_11,
            location,
            remote_addr: None,
            params: None,
            session: None,
            remote_user: None,
            basename: String::new(),
            close: CloseHandle::new(),
        }
    }

    /// Builds a connection from transport data. The location honors the
    /// `X-Forwarded-Proto`/`X-Forwarded-Protocol`/`X-Forwarded-Host`/`X-Forwarded-Port`
    /// headers, then the `Host` header, then `env`.
    pub fn from_request<B>(request: http::Request<B>, remote_addr: Option<SocketAddr>, env: &Environment) -> Self
    where
        B: http_body::Body<Data = bytes::Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let (parts, body) = request.into_parts();
        let location = derive_location(&parts.uri, &parts.headers, env);
        let mut conn = Self::new(parts.method, location, Message::from_parts(parts.headers, Content::from_body(body)));
        conn.version = parts.version;
        conn.remote_addr = remote_addr;
        conn
    }

    /// Runs `app` against this connection and writes its reply onto the response.
    pub async fn call<A: App + ?Sized>(&mut self, app: &A) -> Result<(), Interrupt> {
        let reply = app.call(self).await?;
        self.apply(reply);
        Ok(())
    }

    /// Writes `reply` onto the status and the response; absent fields keep their value.
    pub fn apply(&mut self, reply: impl IntoReply) {
        match reply.into_reply() {
            Reply::Unchanged => {}
            Reply::Status(status) => self.status = status,
            Reply::Content(content) => self.response.set_content(content),
            Reply::Full(parts) => {
                if let Some(status) = parts.status {
                    self.status = status;
                }
                if !parts.headers.is_empty() {
                    self.response.headers_mut().extend(parts.headers);
                }
                if let Some(content) = parts.content {
                    self.response.set_content(content);
                }
            }
        }
    }

    /// The location's pathname below [`Connection::basename`].
    pub fn pathname(&self) -> &str {
        let pathname = self.location.pathname().unwrap_or("/");
        match pathname.strip_prefix(self.basename.as_str()) {
            Some("") => "/",
            Some(rest) if rest.starts_with('/') => rest,
            _ => pathname,
        }
    }

    /// The location's path below [`Connection::basename`], search included.
    pub fn path(&self) -> String {
        format!("{}{}", self.pathname(), self.location.search().unwrap_or_default())
    }

    pub fn params_mut(&mut self) -> &mut Params {
        self.params.get_or_insert_with(Params::new)
    }

    pub fn send(&mut self, status: StatusCode, content: impl Into<Content>) -> Reply {
        self.status = status;
        self.response.set_content(content);
        Reply::Unchanged
    }

    pub fn text(&mut self, status: StatusCode, text: impl Into<String>) -> Reply {
        self.response.set_content_type(HeaderValue::from_static("text/plain"));
        self.send(status, text.into())
    }

    pub fn html(&mut self, status: StatusCode, html: impl Into<String>) -> Reply {
        self.response.set_content_type(HeaderValue::from_static("text/html"));
        self.send(status, html.into())
    }

    pub fn json<T: serde::Serialize>(&mut self, status: StatusCode, value: &T) -> Result<Reply, Interrupt> {
        let body = serde_json::to_vec(value).map_err(mach_http::ContentError::from)?;
        self.response.set_content_type(HeaderValue::from_static("application/json"));
        Ok(self.send(status, body))
    }

    pub fn redirect(&mut self, status: StatusCode, location: &str) -> Result<Reply, Interrupt> {
        let value = HeaderValue::from_str(location).map_err(http::Error::from)?;
        self.response.set_header(header::LOCATION, value);
        Ok(self.send(status, Content::empty()))
    }

    pub fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }

    /// Marks the connection closed by the peer, see [`CloseHandle::close`].
    pub fn on_close(&self) {
        self.close.close();
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_closed()
    }

    /// A scope for an abortable operation, cancelled when the connection closes.
    pub fn abort_scope(&self) -> AbortScope {
        AbortScope { token: self.close.token.child_token() }
    }

    pub fn into_response(self) -> http::Response<Content> {
        let (headers, content) = self.response.into_parts();
        let mut response = http::Response::new(content);
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = headers;
        response
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("method", &self.method)
            .field("location", &self.location.href())
            .field("status", &self.status)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn first_header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    let value = headers.get(name)?.to_str().ok()?;
    value.split(',').next().map(str::trim).filter(|value| !value.is_empty())
}

fn derive_location(uri: &http::Uri, headers: &HeaderMap, env: &Environment) -> Location {
    let protocol = first_header(headers, "x-forwarded-proto")
        .or_else(|| first_header(headers, "x-forwarded-protocol"))
        .map(|protocol| format!("{}:", protocol.trim_end_matches(':').to_ascii_lowercase()))
        .or_else(|| uri.scheme_str().map(|scheme| format!("{scheme}:")))
        .unwrap_or_else(|| env.protocol.clone());

    let host = first_header(headers, "x-forwarded-host")
        .or_else(|| first_header(headers, header::HOST.as_str()))
        .map(str::to_owned)
        .or_else(|| uri.authority().map(|authority| authority.host().to_owned() + &port_suffix(authority.port_u16())))
        .unwrap_or_else(|| {
            if standard_port(&protocol) == Some(env.port.to_string().as_str()) {
                env.host.clone()
            } else {
                format!("{}:{}", env.host, env.port)
            }
        });

    let path = uri.path_and_query().map_or("/", |path_and_query| path_and_query.as_str());

    let mut location = LocationOptions::new().protocol(protocol).host(host).path(path).build();
    if let Some(port) = first_header(headers, "x-forwarded-port") {
        location.set_port(Some(port));
    }
    location
}

fn port_suffix(port: Option<u16>) -> String {
    port.map(|port| format!(":{port}")).unwrap_or_default()
}

/// Signals an early close of the transport to every operation started by a connection.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    token: CancellationToken,
    closed: Arc<AtomicBool>,
}

impl CloseHandle {
    fn new() -> Self {
        Self { token: CancellationToken::new(), closed: Arc::new(AtomicBool::new(false)) }
    }

    /// Cancels outstanding abortable operations exactly once; later calls are no-ops.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("connection closed early");
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, Error)]
#[error("operation aborted")]
pub struct Aborted;

/// Cancellation for one abortable operation.
#[derive(Debug, Clone)]
pub struct AbortScope {
    token: CancellationToken,
}

impl AbortScope {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drives `operation` until it completes or the scope is cancelled; on cancel the
    /// operation is dropped, releasing whatever it holds.
    pub async fn run<F: Future>(&self, operation: F) -> Result<F::Output, Aborted> {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Aborted),
            output = operation => Ok(output),
        }
    }
}
