//! Static files under a root directory.

use super::http_date;
use crate::app::{App, Middleware};
use crate::connection::Connection;
use crate::error::AppResult;
use crate::reply::{IntoReply, ReplyParts};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::header::{self, HeaderValue};
use http::{Method, StatusCode};
use mach_http::Content;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::Deserialize;
use std::fmt::Write;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;
use tracing::trace;

const HREF: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'-').remove(b'_').remove(b'~');

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileOptions {
    pub root: PathBuf,
    /// Files tried, in order, when a directory is requested.
    pub index: Vec<String>,
    /// Render a listing for directories without an index file.
    pub auto_index: bool,
    pub use_last_modified: bool,
    pub use_etag: bool,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            index: vec![],
            auto_index: false,
            use_last_modified: true,
            use_etag: true,
        }
    }
}

/// Serves `GET` and `HEAD` requests from files under the root. Requests for anything that is
/// not there fall through to the downstream app; paths escaping the root get `403`.
#[derive(Debug, Clone)]
pub struct File {
    options: FileOptions,
}

impl File {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_options(FileOptions { root: root.into(), ..FileOptions::default() })
    }

    pub fn with_options(options: FileOptions) -> Self {
        Self { options }
    }

    pub fn index<I, S>(mut self, index: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.index = index.into_iter().map(Into::into).collect();
        self
    }

    pub fn auto_index(mut self, auto_index: bool) -> Self {
        self.options.auto_index = auto_index;
        self
    }

    /// The file system path for a request pathname, `None` when it leaves the root.
    fn resolve(&self, pathname: &str) -> Option<PathBuf> {
        let decoded = percent_decode_str(pathname).decode_utf8().ok()?;
        let mut path = self.options.root.clone();
        for segment in decoded.split('/').filter(|segment| !segment.is_empty() && *segment != ".") {
            if segment == ".." || segment.contains('\\') || segment.contains('\0') {
                return None;
            }
            path.push(segment);
        }
        Some(path)
    }

    async fn serve(&self, head: bool, path: &Path, metadata: &Metadata) -> std::io::Result<ReplyParts> {
        let content_type = mime_guess::from_path(path).first_or_octet_stream();
        let mut parts = ReplyParts::new().status(StatusCode::OK).header(header::CONTENT_LENGTH, metadata.len().into());
        if let Ok(value) = HeaderValue::from_str(content_type.as_ref()) {
            parts = parts.header(header::CONTENT_TYPE, value);
        }

        if let Ok(modified) = metadata.modified() {
            let modified: DateTime<Utc> = modified.into();
            if self.options.use_last_modified {
                if let Ok(value) = HeaderValue::from_str(&http_date(modified)) {
                    parts = parts.header(header::LAST_MODIFIED, value);
                }
            }
            if self.options.use_etag {
                let seconds = modified.timestamp();
                if let Ok(value) = HeaderValue::from_str(&format!("\"{:x}-{seconds:x}\"", metadata.len())) {
                    parts = parts.header(header::ETAG, value);
                }
            }
        }

        if head {
            return Ok(parts);
        }
        let file = tokio::fs::File::open(path).await?;
        Ok(parts.content(Content::stream(ReaderStream::new(file))))
    }

    async fn find_index(&self, dir: &Path) -> Option<(PathBuf, Metadata)> {
        for name in &self.options.index {
            let candidate = dir.join(name);
            if let Ok(metadata) = tokio::fs::metadata(&candidate).await {
                if metadata.is_file() {
                    return Some((candidate, metadata));
                }
            }
        }
        None
    }
}

/// An HTML listing of `dir`; entries that cannot be stat'ed, like broken links, are skipped.
async fn listing(dir: &Path, pathname: &str) -> std::io::Result<String> {
    let mut entries = vec![];
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let Ok(metadata) = tokio::fs::metadata(entry.path()).await else {
            trace!(path = %entry.path().display(), "skipping unreadable directory entry");
            continue;
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push((name, metadata.is_dir()));
    }
    entries.sort();

    let base = if pathname.ends_with('/') { pathname.to_owned() } else { format!("{pathname}/") };
    let title = escape_html(&base);
    let mut html = format!("<!DOCTYPE html>\n<html><head><title>Index of {title}</title></head><body>\n");
    let _ = write!(html, "<h1>Index of {title}</h1>\n<ul>\n");
    if base != "/" {
        html.push_str("<li><a href=\"../\">../</a></li>\n");
    }
    for (name, is_dir) in entries {
        let suffix = if is_dir { "/" } else { "" };
        let href = utf8_percent_encode(&name, HREF);
        let _ = writeln!(html, "<li><a href=\"{href}{suffix}\">{}{suffix}</a></li>", escape_html(&name));
    }
    html.push_str("</ul>\n</body></html>\n");
    Ok(html)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[async_trait]
impl Middleware for File {
    async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult {
        if conn.method != Method::GET && conn.method != Method::HEAD {
            return next.call(conn).await;
        }
        let head = conn.method == Method::HEAD;
        let pathname = conn.pathname().to_owned();
        let Some(path) = self.resolve(&pathname) else {
            return Ok(StatusCode::FORBIDDEN.into_reply());
        };
        let Ok(metadata) = tokio::fs::metadata(&path).await else {
            return next.call(conn).await;
        };

        if metadata.is_file() {
            return Ok(self.serve(head, &path, &metadata).await?.into_reply());
        }
        if !metadata.is_dir() {
            return next.call(conn).await;
        }

        if let Some((index, metadata)) = self.find_index(&path).await {
            return Ok(self.serve(head, &index, &metadata).await?.into_reply());
        }
        if self.options.auto_index {
            let html = listing(&path, &pathname).await?;
            return Ok(ReplyParts::new()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, HeaderValue::from_static("text/html"))
                .content(html)
                .into_reply());
        }
        next.call(conn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::MiddlewareExt;
    use crate::test_support::conn;
    use std::time::UNIX_EPOCH;

    fn modified_seconds(metadata: &Metadata) -> u64 {
        metadata.modified().ok().and_then(|time| time.duration_since(UNIX_EPOCH).ok()).map_or(0, |d| d.as_secs())
    }

    struct Fixture {
        root: PathBuf,
    }

    impl Fixture {
        async fn new(name: &str) -> Self {
            let root = std::env::temp_dir().join(format!("mach-file-{name}-{}", std::process::id()));
            tokio::fs::create_dir_all(root.join("docs")).await.unwrap();
            tokio::fs::write(root.join("hello.txt"), "hello file").await.unwrap();
            tokio::fs::write(root.join("docs/index.html"), "<p>docs</p>").await.unwrap();
            tokio::fs::create_dir_all(root.join("empty")).await.unwrap();
            tokio::fs::write(root.join("empty/a&b.txt"), "x").await.unwrap();
            Self { root }
        }

        async fn get(&self, method: Method, uri: &str) -> Connection {
            let app = File::new(&self.root).index(["index.html"]).auto_index(true).wrap(StatusCode::NOT_FOUND);
            let mut conn = conn(method, uri);
            conn.call(&app).await.unwrap();
            conn
        }

        async fn cleanup(self) {
            tokio::fs::remove_dir_all(&self.root).await.unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_serves_file_with_headers() {
        let fixture = Fixture::new("serve").await;
        let mut conn = fixture.get(Method::GET, "/hello.txt").await;

        assert_eq!(conn.status, StatusCode::OK);
        assert_eq!(conn.response.header(header::CONTENT_TYPE), Some("text/plain"));
        assert_eq!(conn.response.header(header::CONTENT_LENGTH), Some("10"));
        assert!(conn.response.has_header(header::ETAG));

        let metadata = tokio::fs::metadata(fixture.root.join("hello.txt")).await.unwrap();
        let last_modified = conn.response.header(header::LAST_MODIFIED).and_then(super::super::parse_http_date).unwrap();
        assert_eq!(last_modified.timestamp() as u64, modified_seconds(&metadata));

        assert_eq!(conn.response.stringify_content(None, None).await.unwrap(), "hello file");
        fixture.cleanup().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_index_listing_and_fallthrough() {
        let fixture = Fixture::new("index").await;

        let mut docs = fixture.get(Method::GET, "/docs/").await;
        assert_eq!(docs.response.stringify_content(None, None).await.unwrap(), "<p>docs</p>");

        let mut listing = fixture.get(Method::GET, "/empty").await;
        let html = listing.response.stringify_content(None, None).await.unwrap();
        assert!(html.contains("<a href=\"a%26b.txt\">a&amp;b.txt</a>"));

        let missing = fixture.get(Method::GET, "/missing.txt").await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let post = fixture.get(Method::POST, "/hello.txt").await;
        assert_eq!(post.status, StatusCode::NOT_FOUND);
        fixture.cleanup().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_head_and_traversal() {
        let fixture = Fixture::new("head").await;

        let head = fixture.get(Method::HEAD, "/hello.txt").await;
        assert_eq!(head.response.header(header::CONTENT_LENGTH), Some("10"));
        assert_eq!(head.response.content().length(), Some(0));

        let escaped = fixture.get(Method::GET, "/docs/%2e%2e/%2e%2e/etc/passwd").await;
        assert_eq!(escaped.status, StatusCode::FORBIDDEN);
        fixture.cleanup().await;
    }
}
