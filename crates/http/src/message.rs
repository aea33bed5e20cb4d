//! One HTTP message: headers plus content, with content-type driven helpers.

use crate::accept::{Accept, AcceptCharset, AcceptEncoding, AcceptLanguage};
use crate::content::Content;
use crate::error::ContentError;
use crate::media_value::MediaValue;
use crate::params::Params;
use crate::parser::{self, ContentParsers};
use bytes::Bytes;
use http::header::{self, AsHeaderName, HeaderMap, HeaderValue, IntoHeaderName};
use once_cell::sync::OnceCell;

/// The request or the response half of a connection.
///
/// The negotiators are built from their header the first time they are queried and cached
/// until the headers are mutated through [`Message::headers_mut`].
#[derive(Debug, Default)]
pub struct Message {
    headers: HeaderMap,
    content: Content,
    accept: OnceCell<Accept>,
    accept_charset: OnceCell<AcceptCharset>,
    accept_encoding: OnceCell<AcceptEncoding>,
    accept_language: OnceCell<AcceptLanguage>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(headers: HeaderMap, content: Content) -> Self {
        Self { headers, content, ..Self::default() }
    }

    pub fn into_parts(self) -> (HeaderMap, Content) {
        (self.headers, self.content)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.accept.take();
        self.accept_charset.take();
        self.accept_encoding.take();
        self.accept_language.take();
        &mut self.headers
    }

    /// The first value of `name` when it is visible ASCII.
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn has_header<K: AsHeaderName>(&self, name: K) -> bool {
        self.headers.contains_key(name)
    }

    pub fn set_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) {
        self.headers_mut().insert(name, value);
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn set_content(&mut self, content: impl Into<Content>) {
        self.content = content.into();
    }

    /// Takes the content out, leaving a copy behind when it is buffered.
    pub fn take_content(&mut self) -> Content {
        match self.content.try_clone() {
            Some(copy) => copy,
            None => std::mem::take(&mut self.content),
        }
    }

    pub fn is_buffered(&self) -> bool {
        self.content.is_buffered()
    }

    /// The parsed `Content-Type` header.
    pub fn content_type(&self) -> Option<MediaValue> {
        self.header(header::CONTENT_TYPE).map(|value| MediaValue::parse(value, '/'))
    }

    pub fn set_content_type(&mut self, value: HeaderValue) {
        self.set_header(header::CONTENT_TYPE, value);
    }

    /// The lowercased `type/subtype` of the content, without params.
    pub fn media_type(&self) -> Option<String> {
        let content_type = self.content_type()?;
        let media_type = match content_type.subtype() {
            Some(subtype) => format!("{}/{subtype}", content_type.media_type()),
            None => content_type.media_type().to_owned(),
        };
        Some(media_type.to_ascii_lowercase())
    }

    pub fn charset(&self) -> Option<String> {
        let content_type = self.content_type()?;
        content_type.param("charset").map(|charset| charset.trim_matches('"').to_owned())
    }

    /// Drains the content into memory so it can be read again, see [`Content::buffer`].
    ///
    /// Buffered content is returned as is without touching the original stream again.
    pub async fn buffer_content(&mut self, max_length: Option<usize>) -> Result<Bytes, ContentError> {
        if let Some(bytes) = self.content.as_bytes() {
            if max_length.is_some_and(|max| bytes.len() > max) {
                return Err(ContentError::max_length_exceeded(max_length.unwrap_or_default()));
            }
            return Ok(bytes.clone());
        }
        if self.content.is_buffered() {
            return Ok(Bytes::new());
        }

        let bytes = std::mem::take(&mut self.content).buffer(max_length).await?;
        self.content = Content::once(bytes.clone());
        Ok(bytes)
    }

    /// Buffers the content and decodes it with `charset`, falling back to the declared one and
    /// then to `utf-8`.
    pub async fn stringify_content(
        &mut self,
        max_length: Option<usize>,
        charset: Option<&str>,
    ) -> Result<String, ContentError> {
        let charset = charset.map(str::to_owned).or_else(|| self.charset());
        let bytes = self.buffer_content(max_length).await?;
        decode(&bytes, charset.as_deref().unwrap_or("utf-8"))
    }

    /// Parses the content with the default parsers.
    pub async fn parse_content(&mut self, max_length: Option<usize>) -> Result<Params, ContentError> {
        self.parse_content_with(parser::default_parsers(), max_length).await
    }

    /// Dispatches to the parser registered for the media type. Unknown media types yield empty
    /// params and leave the content untouched.
    pub async fn parse_content_with(
        &mut self,
        parsers: &ContentParsers,
        max_length: Option<usize>,
    ) -> Result<Params, ContentError> {
        let Some(content_type) = self.content_type() else {
            return Ok(Params::new());
        };
        let Some(parser) = self.media_type().and_then(|media_type| parsers.get(&media_type)) else {
            return Ok(Params::new());
        };

        let bytes = self.buffer_content(max_length).await?;
        parser.parse(&content_type, bytes).await
    }

    fn header_string(&self, name: header::HeaderName) -> String {
        self.header(name).unwrap_or_default().to_owned()
    }

    pub fn accept(&self) -> &Accept {
        self.accept.get_or_init(|| Accept::new(self.header_string(header::ACCEPT)))
    }

    pub fn accept_charset(&self) -> &AcceptCharset {
        self.accept_charset.get_or_init(|| AcceptCharset::new(self.header_string(header::ACCEPT_CHARSET)))
    }

    pub fn accept_encoding(&self) -> &AcceptEncoding {
        self.accept_encoding.get_or_init(|| AcceptEncoding::new(self.header_string(header::ACCEPT_ENCODING)))
    }

    pub fn accept_language(&self) -> &AcceptLanguage {
        self.accept_language.get_or_init(|| AcceptLanguage::new(self.header_string(header::ACCEPT_LANGUAGE)))
    }

    pub fn accepts(&self, media_type: &str) -> bool {
        self.accept().accepts_media_type(media_type)
    }

    pub fn accepts_charset(&self, charset: &str) -> bool {
        self.accept_charset().accepts_charset(charset)
    }

    pub fn accepts_encoding(&self, encoding: &str) -> bool {
        self.accept_encoding().accepts_encoding(encoding)
    }

    pub fn accepts_language(&self, language: &str) -> bool {
        self.accept_language().accepts_language(language)
    }
}

fn decode(bytes: &[u8], charset: &str) -> Result<String, ContentError> {
    match charset.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" | "us-ascii" | "ascii" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        "iso-8859-1" | "latin1" | "binary" => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        other => Err(ContentError::unsupported_charset(other)),
    }
}
