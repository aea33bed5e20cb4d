use super::parse_http_date;
use crate::app::{App, Middleware};
use crate::connection::Connection;
use crate::error::AppResult;
use crate::reply::Reply;
use async_trait::async_trait;
use http::header;
use http::StatusCode;
use mach_http::Content;

/// Answers conditional requests with `304 Not Modified` when the downstream response is still
/// fresh: its `ETag` is listed in `If-None-Match`, or, without `If-None-Match`, its
/// `Last-Modified` is not later than `If-Modified-Since`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Modified;

impl Modified {
    pub fn new() -> Self {
        Self
    }
}

fn strip_weak(tag: &str) -> &str {
    tag.trim().strip_prefix("W/").unwrap_or(tag.trim())
}

fn is_fresh(conn: &Connection) -> bool {
    if let Some(if_none_match) = conn.request.header(header::IF_NONE_MATCH) {
        let Some(etag) = conn.response.header(header::ETAG) else {
            return false;
        };
        return if_none_match.split(',').any(|tag| tag.trim() == "*" || strip_weak(tag) == strip_weak(etag));
    }

    let since = conn.request.header(header::IF_MODIFIED_SINCE).and_then(parse_http_date);
    let last_modified = conn.response.header(header::LAST_MODIFIED).and_then(parse_http_date);
    match (since, last_modified) {
        (Some(since), Some(last_modified)) => last_modified <= since,
        _ => false,
    }
}

#[async_trait]
impl Middleware for Modified {
    async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult {
        conn.call(next).await?;

        if conn.status == StatusCode::OK && is_fresh(conn) {
            conn.status = StatusCode::NOT_MODIFIED;
            conn.response.set_content(Content::empty());
            let headers = conn.response.headers_mut();
            headers.remove(header::CONTENT_LENGTH);
            headers.remove(header::CONTENT_TYPE);
        }
        Ok(Reply::Unchanged)
    }
}
