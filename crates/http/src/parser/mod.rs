//! Content parsers keyed by media type.
//!
//! [`Message::parse_content`](crate::Message::parse_content) buffers the content and hands it to
//! the parser registered for the message's media type.

mod form;
mod json;
mod multipart;

pub use form::FormParser;
pub use json::JsonParser;
pub use multipart::{DefaultPartHandler, MultipartParser, Part, PartHandler};

use crate::error::ContentError;
use crate::media_value::MediaValue;
use crate::params::Params;
use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const JSON: &str = "application/json";
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

#[async_trait]
pub trait ContentParser: Send + Sync {
    async fn parse(&self, content_type: &MediaValue, content: Bytes) -> Result<Params, ContentError>;
}

/// A registry of [`ContentParser`]s by lowercased `type/subtype`.
#[derive(Clone)]
pub struct ContentParsers {
    parsers: HashMap<String, Arc<dyn ContentParser>>,
}

impl ContentParsers {
    /// A registry without any parser.
    pub fn empty() -> Self {
        Self { parsers: HashMap::new() }
    }

    /// The form, json and multipart parsers; uploads go to the system temp directory.
    pub fn new() -> Self {
        Self::empty()
            .with(FORM_URLENCODED, FormParser)
            .with(JSON, JsonParser)
            .with(MULTIPART_FORM_DATA, MultipartParser::default())
    }

    pub fn with<P: ContentParser + 'static>(mut self, media_type: &str, parser: P) -> Self {
        self.register(media_type, parser);
        self
    }

    pub fn register<P: ContentParser + 'static>(&mut self, media_type: &str, parser: P) {
        self.parsers.insert(media_type.to_ascii_lowercase(), Arc::new(parser));
    }

    pub fn get(&self, media_type: &str) -> Option<&dyn ContentParser> {
        self.parsers.get(&media_type.to_ascii_lowercase()).map(|parser| &**parser)
    }
}

impl Default for ContentParsers {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContentParsers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.parsers.keys()).finish()
    }
}

static DEFAULT_PARSERS: Lazy<ContentParsers> = Lazy::new(ContentParsers::new);

pub fn default_parsers() -> &'static ContentParsers {
    &DEFAULT_PARSERS
}
