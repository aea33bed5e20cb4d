//! Composable apps and middleware over an abstract HTTP connection
//!
//! An [`App`] is anything that turns a [`Connection`] into a [`Reply`]. A [`Middleware`]
//! wraps a downstream app: it edits the request, awaits `conn.call(next)` and edits the
//! response. A [`Stack`] folds declared middleware, path mappings and routes around a terminal
//! app, outermost first, and a [`Transport`] drives one request through the result.
//!
//! # Example
//!
//! ```no_run
//! use futures::FutureExt;
//! use mach_web::middleware::{Catch, Logger, Router};
//! use mach_web::{IntoReply, Stack, Transport, app_fn};
//!
//! # async fn run() -> Result<(), mach_web::Error> {
//! let router = Router::builder()
//!     .get("/hello/:name", app_fn(|conn| {
//!         async move {
//!             let name = conn.params_mut().get_str("name").unwrap_or("world").to_owned();
//!             Ok(format!("Hello, {name}!").into_reply())
//!         }
//!         .boxed()
//!     }))
//!     .build()?;
//!
//! let app = Stack::new().with(Logger::new()).with(Catch::new()).build(router)?;
//! let transport = Transport::builder().app(app).build().map_err(mach_web::Error::other)?;
//!
//! let request = http::Request::get("/hello/mach").header("host", "localhost").body(String::new())?;
//! let response = transport.handle(request, None).await;
//! assert_eq!(response.status(), http::StatusCode::OK);
//! # Ok(())
//! # }
//! ```
//!
//! # Control flow
//!
//! Apps return [`AppResult`]. Besides true failures, [`Interrupt::Halt`] carries a reply out
//! of the chain past every middleware up to the nearest [`middleware::Catch`] or the
//! transport, which answers with it.

mod app;
mod connection;
mod error;
mod reply;
mod stack;
#[cfg(test)]
mod test_support;
mod transport;

pub mod middleware;

pub use app::{App, AppFn, BoxApp, Middleware, MiddlewareExt, Wrapped, app_fn};
pub use connection::{AbortScope, Aborted, CloseHandle, Connection, Environment};
pub use error::{AppResult, Error, Interrupt};
pub use reply::{IntoReply, Reply, ReplyParts};
pub use stack::Stack;
pub use transport::{Transport, TransportBuildError, TransportBuilder};

pub use mach_http::{Content, ContentError, Location, LocationError, Message, Param, Params};
