//! Cookie based sessions over a pluggable [`Store`].

mod cookie;
mod memory;

pub use self::cookie::CookieStore;
pub use self::memory::MemoryStore;

use crate::app::{App, Middleware};
use crate::connection::Connection;
use crate::error::{AppResult, Error, Interrupt};
use crate::reply::Reply;
use ::cookie::Cookie;
use ::cookie::time::{Duration as CookieDuration, OffsetDateTime};
use async_trait::async_trait;
use http::header::{self, HeaderMap, HeaderValue};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Data kept across the requests of one client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    token: Option<String>,
    data: Map<String, Value>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// The token the session is stored under, `None` until first saved.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.data.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }
}

/// Where sessions live between requests.
#[async_trait]
pub trait Store: Send + Sync {
    /// The session stored under `token`; an empty session when it is unknown or expired.
    async fn load(&self, token: &str) -> Result<Session, Error>;

    /// Persists `session`, assigning it a token on first save, and returns the token.
    async fn save(&self, session: &mut Session) -> Result<String, Error>;

    /// Drops the session under `token`, or every expired session when `None`.
    async fn purge(&self, _token: Option<&str>) -> Result<(), Error> {
        Ok(())
    }

    /// Releases the store's resources.
    async fn destroy(&self) {}
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn load(&self, token: &str) -> Result<Session, Error> {
        self.as_ref().load(token).await
    }

    async fn save(&self, session: &mut Session) -> Result<String, Error> {
        self.as_ref().save(session).await
    }

    async fn purge(&self, token: Option<&str>) -> Result<(), Error> {
        self.as_ref().purge(token).await
    }

    async fn destroy(&self) {
        self.as_ref().destroy().await;
    }
}

/// A random 128 bit token, hex encoded.
pub(crate) fn generate_token() -> Result<String, Error> {
    let mut data = [0u8; 16];
    SystemRandom::new().fill(&mut data).map_err(Error::other)?;
    Ok(hex::encode(data))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Cookie name.
    pub name: String,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    /// Cookie lifetime in seconds, a browser session cookie when unset.
    pub expire_after: Option<u64>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { name: "_session".into(), path: "/".into(), domain: None, secure: false, http_only: true, expire_after: None }
    }
}

/// Loads [`Connection::session`] from the session cookie before the downstream app runs,
/// and saves it afterwards.
///
/// A session emptied by the downstream app is purged from the store and its cookie removed.
pub struct Sessions {
    store: Arc<dyn Store>,
    options: SessionOptions,
}

impl Sessions {
    pub fn new(store: impl Store + 'static) -> Self {
        Self::with_options(store, SessionOptions::default())
    }

    pub fn with_options(store: impl Store + 'static, options: SessionOptions) -> Self {
        Self { store: Arc::new(store), options }
    }

    pub fn builder(store: impl Store + 'static) -> SessionsBuilder {
        SessionsBuilder { store: Arc::new(store), options: SessionOptions::default() }
    }

    fn cookie_value(&self, token: String, removal: bool) -> Result<HeaderValue, Interrupt> {
        let options = &self.options;
        let mut builder = Cookie::build((options.name.clone(), token))
            .path(options.path.clone())
            .secure(options.secure)
            .http_only(options.http_only);
        if let Some(domain) = &options.domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(seconds) = options.expire_after {
            let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
            builder = builder.expires(OffsetDateTime::now_utc().saturating_add(CookieDuration::seconds(seconds)));
        }

        let mut cookie = builder.build();
        if removal {
            cookie.make_removal();
        }
        HeaderValue::from_str(&cookie.encoded().to_string()).map_err(|e| http::Error::from(e).into())
    }
}

impl fmt::Debug for Sessions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sessions").field("options", &self.options).finish_non_exhaustive()
    }
}

pub struct SessionsBuilder {
    store: Arc<dyn Store>,
    options: SessionOptions,
}

impl SessionsBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = name.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.options.path = path.into();
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.options.domain = Some(domain.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.options.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.options.http_only = http_only;
        self
    }

    pub fn expire_after(mut self, seconds: u64) -> Self {
        self.options.expire_after = Some(seconds);
        self
    }

    pub fn build(self) -> Sessions {
        Sessions { store: self.store, options: self.options }
    }
}

impl fmt::Debug for SessionsBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionsBuilder").field("options", &self.options).finish_non_exhaustive()
    }
}

fn session_token(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse_encoded)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_owned())
}

#[async_trait]
impl Middleware for Sessions {
    async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult {
        let token = session_token(conn.request.headers(), &self.options.name);
        let session = match token {
            Some(token) => self.store.load(&token).await?,
            None => Session::new(),
        };
        conn.session = Some(session);

        conn.call(next).await?;

        let Some(mut session) = conn.session.take() else {
            return Ok(Reply::Unchanged);
        };
        let cookie = if !session.is_empty() {
            let token = self.store.save(&mut session).await?;
            Some(self.cookie_value(token, false)?)
        } else if let Some(token) = session.token.take() {
            self.store.purge(Some(&token)).await?;
            Some(self.cookie_value(String::new(), true)?)
        } else {
            None
        };
        if let Some(cookie) = cookie {
            conn.response.headers_mut().append(header::SET_COOKIE, cookie);
        }
        conn.session = Some(session);
        Ok(Reply::Unchanged)
    }
}
