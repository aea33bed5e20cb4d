use crate::app::{App, Middleware};
use crate::connection::Connection;
use crate::error::AppResult;
use crate::reply::{IntoReply, ReplyParts};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::FutureExt;
use futures::future::BoxFuture;
use http::header::{self, HeaderValue};
use http::StatusCode;
use std::fmt;
use std::future::Future;

type Validator = Box<dyn Fn(String, String) -> BoxFuture<'static, bool> + Send + Sync>;

/// HTTP basic authentication. A request whose credentials pass the validator continues with
/// [`Connection::remote_user`] set; any other request gets a `401` challenge.
pub struct BasicAuth {
    realm: String,
    validator: Validator,
}

impl BasicAuth {
    pub fn new<F, Fut>(realm: impl Into<String>, validator: F) -> Self
    where
        F: Fn(String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self { realm: realm.into(), validator: Box::new(move |user, password| validator(user, password).boxed()) }
    }

    fn challenge(&self) -> ReplyParts {
        let realm = self.realm.replace('"', "");
        let mut parts = ReplyParts::new().status(StatusCode::UNAUTHORIZED).content("Unauthorized");
        if let Ok(value) = HeaderValue::from_str(&format!("Basic realm=\"{realm}\"")) {
            parts = parts.header(header::WWW_AUTHENTICATE, value);
        }
        parts
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth").field("realm", &self.realm).finish_non_exhaustive()
    }
}

/// The `user:password` pair of an `Authorization: Basic ...` value.
fn credentials(authorization: &str) -> Option<(String, String)> {
    let (scheme, encoded) = authorization.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_owned(), password.to_owned()))
}

#[async_trait]
impl Middleware for BasicAuth {
    async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult {
        let Some((user, password)) = conn.request.header(header::AUTHORIZATION).and_then(credentials) else {
            return Ok(self.challenge().into_reply());
        };

        if !(self.validator)(user.clone(), password).await {
            return Ok(self.challenge().into_reply());
        }
        conn.remote_user = Some(user);
        next.call(conn).await
    }
}
