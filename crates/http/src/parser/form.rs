use super::ContentParser;
use crate::error::ContentError;
use crate::media_value::MediaValue;
use crate::params::Params;
use crate::query::Query;
use async_trait::async_trait;
use bytes::Bytes;

/// Parses `application/x-www-form-urlencoded` content, repeated names become lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormParser;

#[async_trait]
impl ContentParser for FormParser {
    async fn parse(&self, _content_type: &MediaValue, content: Bytes) -> Result<Params, ContentError> {
        let text = String::from_utf8_lossy(&content);
        Ok(Params::from(Query::parse(&text)))
    }
}
