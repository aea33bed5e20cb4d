//! Message content: either an in-memory buffer, which can be replayed, or a single-pass stream.

use crate::error::ContentError;
use bytes::{Bytes, BytesMut};
use futures::{Stream, TryStreamExt};
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, StreamBody};
use std::error::Error;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

pub struct Content {
    kind: Kind,
}

enum Kind {
    Once(Option<Bytes>),
    Stream(UnsyncBoxBody<Bytes, ContentError>),
}

impl Content {
    pub fn empty() -> Self {
        Self { kind: Kind::Once(None) }
    }

    pub fn once(bytes: impl Into<Bytes>) -> Self {
        Self { kind: Kind::Once(Some(bytes.into())) }
    }

    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<Box<dyn Error + Send + Sync>> + 'static,
    {
        let frames = stream.map_ok(Frame::data).map_err(ContentError::stream);
        Self { kind: Kind::Stream(StreamBody::new(frames).boxed_unsync()) }
    }

    /// Adapts any [`http_body::Body`], e.g. the request body handed over by a transport.
    pub fn from_body<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn Error + Send + Sync>> + 'static,
    {
        Self { kind: Kind::Stream(body.map_err(ContentError::stream).boxed_unsync()) }
    }

    /// `true` when the content lives in memory and can be read any number of times.
    pub fn is_buffered(&self) -> bool {
        matches!(self.kind, Kind::Once(_))
    }

    /// The in-memory bytes, if buffered and not empty.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.kind {
            Kind::Once(bytes) => bytes.as_ref(),
            Kind::Stream(_) => None,
        }
    }

    /// A cheap copy of buffered content; streams cannot be copied.
    pub fn try_clone(&self) -> Option<Self> {
        match &self.kind {
            Kind::Once(bytes) => Some(Self { kind: Kind::Once(bytes.clone()) }),
            Kind::Stream(_) => None,
        }
    }

    /// Drains the content into memory, failing once more than `max_length` bytes arrived.
    pub async fn buffer(self, max_length: Option<usize>) -> Result<Bytes, ContentError> {
        let exceeds = |len: usize| max_length.is_some_and(|max| len > max);

        match self.kind {
            Kind::Once(None) => Ok(Bytes::new()),
            Kind::Once(Some(bytes)) => {
                if exceeds(bytes.len()) {
                    return Err(ContentError::max_length_exceeded(max_length.unwrap_or_default()));
                }
                Ok(bytes)
            }
            Kind::Stream(mut body) => {
                let mut buf = BytesMut::new();
                while let Some(frame) = body.frame().await {
                    let Ok(data) = frame?.into_data() else {
                        continue;
                    };
                    if exceeds(buf.len() + data.len()) {
                        return Err(ContentError::max_length_exceeded(max_length.unwrap_or_default()));
                    }
                    buf.extend_from_slice(&data);
                }
                Ok(buf.freeze())
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, ContentError>> + Send {
        self.into_data_stream()
    }

    /// The exact length, when known up front.
    pub fn length(&self) -> Option<u64> {
        self.size_hint().exact()
    }
}

impl Default for Content {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Once(None) => f.write_str("Content::Empty"),
            Kind::Once(Some(bytes)) => f.debug_tuple("Content::Once").field(&bytes.len()).finish(),
            Kind::Stream(_) => f.write_str("Content::Stream"),
        }
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Self::once(value)
    }
}

impl From<&'static str> for Content {
    fn from(value: &'static str) -> Self {
        if value.is_empty() { Self::empty() } else { Self::once(value) }
    }
}

impl From<Bytes> for Content {
    fn from(value: Bytes) -> Self {
        Self::once(value)
    }
}

impl From<Vec<u8>> for Content {
    fn from(value: Vec<u8>) -> Self {
        Self::once(value)
    }
}

impl From<()> for Content {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

impl HttpBody for Content {
    type Data = Bytes;
    type Error = ContentError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().kind {
            Kind::Once(option_bytes) => Poll::Ready(option_bytes.take().map(|bytes| Ok(Frame::data(bytes)))),
            Kind::Stream(box_body) => Pin::new(box_body).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Once(option_bytes) => option_bytes.is_none(),
            Kind::Stream(box_body) => box_body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Once(None) => SizeHint::with_exact(0),
            Kind::Once(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            Kind::Stream(box_body) => box_body.size_hint(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn chunked(chunks: &[&'static str]) -> Content {
        let items: Vec<Result<Bytes, io::Error>> = chunks.iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect();
        Content::stream(futures::stream::iter(items))
    }

    fn check_send<T: Send>() {}

    #[test]
    fn is_send() {
        check_send::<Content>();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_once_content() {
        let mut content = Content::from("Hello world".to_string());
        assert_eq!(content.length(), Some(11));
        assert!(!content.is_end_stream());

        let bytes = content.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(bytes, Bytes::from("Hello world"));
        assert!(content.is_end_stream());
        assert!(content.frame().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_buffer_stream() {
        let content = chunked(&["ab", "cd", "e"]);
        assert!(!content.is_buffered());
        assert_eq!(content.buffer(Some(5)).await.unwrap(), Bytes::from("abcde"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_buffer_max_length_exceeded() {
        let result = chunked(&["ab", "cd", "e"]).buffer(Some(4)).await;
        assert!(matches!(result, Err(ContentError::MaxLengthExceeded { max_length: 4 })));

        let result = Content::from("too long").buffer(Some(3)).await;
        assert!(result.is_err_and(|e| e.is_max_length_exceeded()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_buffer_propagates_stream_errors() {
        let items: Vec<Result<Bytes, io::Error>> =
            vec![Ok(Bytes::from("a")), Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))];
        let result = Content::stream(futures::stream::iter(items)).buffer(None).await;
        assert!(matches!(result, Err(ContentError::Stream { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_from_body() {
        let frames: Vec<Result<Frame<Bytes>, io::Error>> = vec![Ok(Frame::data(Bytes::from("he"))), Ok(Frame::data(Bytes::from("llo")))];
        let content = Content::from_body(StreamBody::new(futures::stream::iter(frames)));
        assert_eq!(content.buffer(None).await.unwrap(), Bytes::from("hello"));
    }

    #[test]
    fn test_try_clone() {
        assert!(Content::from("x").try_clone().is_some());
        assert!(chunked(&["x"]).try_clone().is_none());
    }
}
