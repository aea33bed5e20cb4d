use super::ContentParser;
use crate::error::ContentError;
use crate::media_value::MediaValue;
use crate::params::{Param, Params};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

/// Parses a JSON object into params. Empty content yields empty params, any other top level
/// value is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

#[async_trait]
impl ContentParser for JsonParser {
    async fn parse(&self, _content_type: &MediaValue, content: Bytes) -> Result<Params, ContentError> {
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Params::new());
        }

        match serde_json::from_slice::<Value>(&content)? {
            Value::Object(map) => Ok(map.into_iter().map(|(name, value)| (name, Param::from(value))).collect()),
            other => Err(ContentError::invalid_content(format!("expected a json object, found {other}"))),
        }
    }
}
