//! Coercion of app results into one canonical reply.

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use mach_http::Content;

/// What an app hands back to [`Connection::call`](crate::Connection::call).
///
/// Fields a reply leaves out keep the connection's current state.
#[derive(Debug)]
pub enum Reply {
    /// The app already wrote its response onto the connection.
    Unchanged,
    Status(StatusCode),
    Content(Content),
    Full(ReplyParts),
}

impl Reply {
    /// The status this reply sets, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(status) => Some(*status),
            Self::Full(parts) => parts.status,
            Self::Unchanged | Self::Content(_) => None,
        }
    }

    /// The content this reply sets, if any.
    pub fn content(&self) -> Option<&Content> {
        match self {
            Self::Content(content) => Some(content),
            Self::Full(parts) => parts.content.as_ref(),
            Self::Unchanged | Self::Status(_) => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReplyParts {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub content: Option<Content>,
}

impl ReplyParts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn content(mut self, content: impl Into<Content>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Types an app may return.
pub trait IntoReply {
    fn into_reply(self) -> Reply;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Reply {
        self
    }
}

impl IntoReply for ReplyParts {
    fn into_reply(self) -> Reply {
        Reply::Full(self)
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Reply {
        Reply::Unchanged
    }
}

impl IntoReply for StatusCode {
    fn into_reply(self) -> Reply {
        Reply::Status(self)
    }
}

impl IntoReply for Content {
    fn into_reply(self) -> Reply {
        Reply::Content(self)
    }
}

macro_rules! content_reply {
    ($($ty:ty),*) => {
        $(
            impl IntoReply for $ty {
                fn into_reply(self) -> Reply {
                    Reply::Content(Content::from(self))
                }
            }
        )*
    };
}

content_reply!(&'static str, String, Bytes, Vec<u8>);

impl IntoReply for serde_json::Value {
    fn into_reply(self) -> Reply {
        ReplyParts::new()
            .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .content(self.to_string())
            .into_reply()
    }
}

impl<T: IntoReply> IntoReply for (StatusCode, T) {
    fn into_reply(self) -> Reply {
        let (status, inner) = self;
        match inner.into_reply() {
            Reply::Unchanged | Reply::Status(_) => Reply::Status(status),
            Reply::Content(content) => Reply::Full(ReplyParts::new().status(status).content(content)),
            Reply::Full(parts) => Reply::Full(ReplyParts { status: Some(status), ..parts }),
        }
    }
}
