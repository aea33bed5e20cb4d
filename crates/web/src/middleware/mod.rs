//! The standard middleware and dispatching apps.
//!
//! Middleware implement [`Middleware`](crate::Middleware) and are layered with a
//! [`Stack`](crate::Stack) or [`MiddlewareExt::wrap`](crate::MiddlewareExt::wrap).
//! [`Router`] and [`Mapper`] are apps that pick one of several downstream apps.

mod basic_auth;
mod catch;
mod charset;
mod content_type;
mod favicon;
mod file;
mod gzip;
mod logger;
mod mapper;
mod method_override;
mod modified;
mod params;
mod proxy;
mod rewrite;
mod router;
pub mod session;

pub use basic_auth::BasicAuth;
pub use catch::Catch;
pub use charset::Charset;
pub use content_type::ContentType;
pub use favicon::Favicon;
pub use file::{File, FileOptions};
pub use gzip::Gzip;
pub use logger::Logger;
pub use mapper::{Mapper, MapperBuilder};
pub use method_override::MethodOverride;
pub use modified::Modified;
pub use params::ParamsParser;
pub use proxy::{HttpUpstream, Proxy, Upstream, UpstreamError};
pub use rewrite::Rewrite;
pub use router::{Router, RouterBuilder};
pub use session::{CookieStore, MemoryStore, Session, SessionOptions, Sessions, SessionsBuilder, Store};

/// `true` for media types bodies of which are text: `text/*`, json, javascript and xml.
pub(crate) fn is_textual(media_type: &str) -> bool {
    media_type.starts_with("text/")
        || media_type.ends_with("/json")
        || media_type.ends_with("+json")
        || media_type.ends_with("/javascript")
        || media_type.ends_with("/xml")
        || media_type.ends_with("+xml")
}

/// Formats a timestamp as an HTTP-date, `Sun, 06 Nov 1994 08:49:37 GMT`.
pub(crate) fn http_date(time: chrono::DateTime<chrono::Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parses an HTTP-date as sent in `If-Modified-Since` and `Last-Modified`.
pub(crate) fn parse_http_date(value: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc2822(value.trim()).ok().map(|time| time.with_timezone(&chrono::Utc))
}
