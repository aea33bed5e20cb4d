//! Response compression. The encoders work on a growable buffer that is drained after every
//! chunk, so compressed output streams out as the content arrives.

use super::is_textual;
use crate::app::{App, Middleware};
use crate::connection::Connection;
use crate::error::AppResult;
use crate::reply::Reply;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use futures::StreamExt;
use http::header::{self, HeaderValue};
use http::StatusCode;
use mach_http::Content;
use mach_http::accept::Negotiator;
use std::io::{self, Write};
use tracing::trace;
use zstd::stream::write::Encoder as ZstdEncoder;

/// Encodings in the order they are offered when the client weighs them equally.
const ENCODINGS: &[&str] = &["gzip", "deflate", "br", "zstd"];

/// The in-memory sink every encoder writes its compressed output into.
struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    /// Drains what the encoder has produced so far.
    fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Represents the supported content encodings.
enum Encoder {
    /// Gzip encoding.
    Gzip(GzEncoder<Writer>),
    /// Deflate encoding.
    Deflate(ZlibEncoder<Writer>),
    /// Zstd encoding.
    Zstd(ZstdEncoder<'static, Writer>),
    /// Brotli encoding.
    Br(Box<brotli::CompressorWriter<Writer>>),
}

impl Encoder {
    /// Creates the encoder for a negotiated encoding name, gzip for anything unknown.
    fn for_name(name: &str) -> io::Result<Self> {
        Ok(match name {
            "deflate" => Self::Deflate(ZlibEncoder::new(Writer::new(), Compression::default())),
            "zstd" => Self::Zstd(ZstdEncoder::new(Writer::new(), 6)?),
            "br" => Self::Br(Box::new(brotli::CompressorWriter::new(
                Writer::new(),
                32 * 1024, // buffer size
                3,         // quality
                22,        // lgwin
            ))),
            _ => Self::Gzip(GzEncoder::new(Writer::new(), Compression::default())),
        })
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Gzip(encoder) => encoder.write_all(data),
            Self::Deflate(encoder) => encoder.write_all(data),
            Self::Zstd(encoder) => encoder.write_all(data),
            Self::Br(encoder) => encoder.write_all(data),
        }
    }

    fn take(&mut self) -> Bytes {
        match self {
            Self::Gzip(encoder) => encoder.get_mut().take(),
            Self::Deflate(encoder) => encoder.get_mut().take(),
            Self::Zstd(encoder) => encoder.get_mut().take(),
            Self::Br(encoder) => encoder.get_mut().take(),
        }
    }

    /// Flushes the trailer and returns the remaining output.
    fn finish(self) -> io::Result<Bytes> {
        let mut writer = match self {
            Self::Gzip(encoder) => encoder.finish()?,
            Self::Deflate(encoder) => encoder.finish()?,
            Self::Zstd(encoder) => encoder.finish()?,
            Self::Br(mut encoder) => {
                encoder.flush()?;
                encoder.into_inner()
            }
        };
        Ok(writer.take())
    }
}

fn encode(content: Content, encoder: Encoder) -> Content {
    let state = (content.into_stream().boxed(), Some(encoder));
    let encoded = futures::stream::unfold(state, |(mut stream, mut encoder)| async move {
        loop {
            let active = encoder.as_mut()?;
            match stream.next().await {
                Some(Ok(data)) => {
                    if let Err(e) = active.write(&data) {
                        trace!(cause = %e, "encoding failed");
                        return Some((Err(e), (stream, None)));
                    }
                    let bytes = active.take();
                    if bytes.is_empty() {
                        continue;
                    }
                    return Some((Ok(bytes), (stream, encoder)));
                }
                Some(Err(e)) => return Some((Err(io::Error::other(e)), (stream, None))),
                None => {
                    let finished = encoder.take()?.finish();
                    return Some((finished, (stream, None)));
                }
            }
        }
    });
    Content::stream(encoded)
}

/// Compresses textual responses with the encoding the client prefers among gzip, deflate, br
/// and zstd. Responses that are already encoded, empty or not textual are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gzip;

impl Gzip {
    pub fn new() -> Self {
        Self
    }
}

fn should_encode(conn: &Connection) -> bool {
    if matches!(conn.status, StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED) || conn.status.is_informational() {
        return false;
    }
    if conn.response.has_header(header::CONTENT_ENCODING) || conn.response.content().length() == Some(0) {
        return false;
    }
    conn.response.media_type().is_some_and(|media_type| is_textual(&media_type))
}

#[async_trait]
impl Middleware for Gzip {
    async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult {
        conn.call(next).await?;

        if !conn.request.has_header(header::ACCEPT_ENCODING) || !should_encode(conn) {
            return Ok(Reply::Unchanged);
        }
        let Some(name) = conn.request.accept_encoding().preferred(ENCODINGS) else {
            return Ok(Reply::Unchanged);
        };

        let encoder = Encoder::for_name(name)?;
        let content = encode(conn.response.take_content(), encoder);
        conn.response.set_content(content);

        let headers = conn.response.headers_mut();
        headers.remove(header::CONTENT_LENGTH);
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(name));
        headers.append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        Ok(Reply::Unchanged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::MiddlewareExt;
    use crate::test_support::{conn_with, request};
    use crate::{IntoReply, ReplyParts, app_fn};
    use flate2::read::GzDecoder;
    use futures::FutureExt;
    use http::Method;
    use std::io::Read;

    const TEXT: &str = "mach mach mach mach mach mach mach mach mach mach mach mach";

    fn page() -> impl App {
        Gzip::new().wrap(app_fn(|_conn| {
            async move {
                Ok(ReplyParts::new()
                    .header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))
                    .content(TEXT)
                    .into_reply())
            }
            .boxed()
        }))
    }

    async fn fetch(accept_encoding: Option<&'static str>) -> Connection {
        let mut request = request(Method::GET, "/");
        if let Some(value) = accept_encoding {
            request.headers_mut().insert(header::ACCEPT_ENCODING, HeaderValue::from_static(value));
        }
        let mut conn = conn_with(request);
        conn.call(&page()).await.unwrap();
        conn
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_gzip_round_trip() {
        let mut conn = fetch(Some("gzip, deflate")).await;
        assert_eq!(conn.response.header(header::CONTENT_ENCODING), Some("gzip"));

        let compressed = conn.response.buffer_content(None).await.unwrap();
        let mut decoded = String::new();
        GzDecoder::new(&compressed[..]).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, TEXT);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_preferred_encoding() {
        let conn = fetch(Some("gzip;q=0.5, br")).await;
        assert_eq!(conn.response.header(header::CONTENT_ENCODING), Some("br"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_untouched_without_acceptable_encoding() {
        let conn = fetch(None).await;
        assert!(!conn.response.has_header(header::CONTENT_ENCODING));

        let conn = fetch(Some("identity")).await;
        assert!(!conn.response.has_header(header::CONTENT_ENCODING));
        assert_eq!(conn.response.content().length(), Some(TEXT.len() as u64));
    }
}
