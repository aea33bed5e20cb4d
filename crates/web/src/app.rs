//! Apps and the middleware that wraps them.

use crate::connection::Connection;
use crate::error::AppResult;
use crate::reply::Reply;
use async_trait::async_trait;
use futures::future::BoxFuture;
use http::StatusCode;
use std::sync::Arc;

/// A function of a connection that eventually produces a reply.
#[async_trait]
pub trait App: Send + Sync {
    async fn call(&self, conn: &mut Connection) -> AppResult;
}

pub type BoxApp = Arc<dyn App>;

#[async_trait]
impl<A: App + ?Sized> App for Arc<A> {
    async fn call(&self, conn: &mut Connection) -> AppResult {
        self.as_ref().call(conn).await
    }
}

#[async_trait]
impl<A: App + ?Sized> App for Box<A> {
    async fn call(&self, conn: &mut Connection) -> AppResult {
        self.as_ref().call(conn).await
    }
}

/// A bare status code is a terminal app answering with that status.
#[async_trait]
impl App for StatusCode {
    async fn call(&self, _conn: &mut Connection) -> AppResult {
        Ok(Reply::Status(*self))
    }
}

/// An app from a closure returning a boxed future.
#[derive(Clone)]
pub struct AppFn<F> {
    f: F,
}

impl<F> std::fmt::Debug for AppFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppFn").finish_non_exhaustive()
    }
}

/// ```
/// use futures::FutureExt;
/// use mach_web::{app_fn, IntoReply};
///
/// let hello = app_fn(|_conn| async move { Ok("Hello".into_reply()) }.boxed());
/// ```
pub fn app_fn<F>(f: F) -> AppFn<F>
where
    F: for<'a> Fn(&'a mut Connection) -> BoxFuture<'a, AppResult> + Send + Sync,
{
    AppFn { f }
}

#[async_trait]
impl<F> App for AppFn<F>
where
    F: for<'a> Fn(&'a mut Connection) -> BoxFuture<'a, AppResult> + Send + Sync,
{
    async fn call(&self, conn: &mut Connection) -> AppResult {
        (self.f)(conn).await
    }
}

/// Behavior around a downstream app.
///
/// A middleware usually edits the request, awaits `conn.call(next)` and then edits the
/// response. It may also answer on its own without ever calling `next`.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult;
}

#[async_trait]
impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult {
        self.as_ref().handle(conn, next).await
    }
}

/// A middleware closed over its downstream app.
pub struct Wrapped<M> {
    middleware: M,
    next: BoxApp,
}

impl<M: Middleware> Wrapped<M> {
    pub fn new(middleware: M, next: BoxApp) -> Self {
        Self { middleware, next }
    }
}

impl<M: std::fmt::Debug> std::fmt::Debug for Wrapped<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wrapped").field("middleware", &self.middleware).finish_non_exhaustive()
    }
}

#[async_trait]
impl<M: Middleware> App for Wrapped<M> {
    async fn call(&self, conn: &mut Connection) -> AppResult {
        self.middleware.handle(conn, self.next.as_ref()).await
    }
}

pub trait MiddlewareExt: Middleware + Sized {
    /// Closes the middleware over `next`.
    fn wrap<A: App + 'static>(self, next: A) -> Wrapped<Self> {
        Wrapped::new(self, Arc::new(next))
    }
}

impl<M: Middleware> MiddlewareExt for M {}
