//! `multipart/form-data` decomposition.
//!
//! The content is split on the boundary declared in `Content-Type`. Every part that carries a
//! name is handed to a [`PartHandler`], which turns it into a [`Param`]: by default file parts
//! are written to disk and everything else is read as text.

use super::ContentParser;
use crate::error::ContentError;
use crate::media_value::MediaValue;
use crate::params::{Param, Params, UploadedFile};
use crate::utils::ensure;
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use memchr::memmem;
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tracing::trace;

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";
const MAX_BOUNDARY_LEN: usize = 70;

/// One decoded part of a multipart message.
#[derive(Debug, Clone)]
pub struct Part {
    headers: HeaderMap,
    name: Option<String>,
    filename: Option<String>,
    content: Bytes,
}

impl Part {
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The `name` of the `Content-Disposition` header, or the `Content-ID` when absent.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The client supplied file name, reduced to its last path segment.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok())
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }

    /// Writes the content to a new, uniquely named file under `dir`.
    pub async fn save_to(&self, dir: &Path) -> Result<UploadedFile, ContentError> {
        let path = dir.join(unique_file_name()?);
        let mut file = tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await?;
        file.write_all(&self.content).await?;
        file.flush().await?;

        trace!(path = %path.display(), size = self.content.len(), "saved multipart upload");
        Ok(UploadedFile {
            path,
            name: self.filename.clone(),
            content_type: self.content_type().map(str::to_owned),
            size: self.content.len() as u64,
        })
    }
}

/// `mach-upload-<millis>-<pid>-<random hex>`; the random component keeps concurrent uploads
/// of the same process apart.
fn unique_file_name() -> Result<String, ContentError> {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_millis());
    let mut random = [0u8; 8];
    SystemRandom::new().fill(&mut random).map_err(|e| io::Error::other(e.to_string()))?;
    Ok(format!("mach-upload-{millis}-{}-{}", std::process::id(), hex::encode(random)))
}

/// Decides what each named part becomes.
#[async_trait]
pub trait PartHandler: Send + Sync {
    /// `None` drops the part from the parsed params.
    async fn handle_part(&self, part: Part) -> Result<Option<Param>, ContentError>;
}

/// Saves file parts under `upload_dir`, reads the others as utf-8 text.
#[derive(Debug, Clone)]
pub struct DefaultPartHandler {
    upload_dir: PathBuf,
}

impl DefaultPartHandler {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self { upload_dir: upload_dir.into() }
    }
}

impl Default for DefaultPartHandler {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

#[async_trait]
impl PartHandler for DefaultPartHandler {
    async fn handle_part(&self, part: Part) -> Result<Option<Param>, ContentError> {
        if part.is_file() {
            return Ok(Some(Param::File(part.save_to(&self.upload_dir).await?)));
        }
        Ok(Some(Param::Text(String::from_utf8_lossy(part.content()).into_owned())))
    }
}

pub struct MultipartParser {
    handler: Arc<dyn PartHandler>,
}

impl MultipartParser {
    pub fn new<H: PartHandler + 'static>(handler: H) -> Self {
        Self { handler: Arc::new(handler) }
    }
}

impl Default for MultipartParser {
    fn default() -> Self {
        Self::new(DefaultPartHandler::default())
    }
}

impl fmt::Debug for MultipartParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartParser").finish_non_exhaustive()
    }
}

#[async_trait]
impl ContentParser for MultipartParser {
    async fn parse(&self, content_type: &MediaValue, content: Bytes) -> Result<Params, ContentError> {
        let boundary = content_type
            .param("boundary")
            .map(|boundary| boundary.trim_matches('"'))
            .filter(|boundary| !boundary.is_empty())
            .ok_or_else(|| ContentError::multipart("missing boundary"))?;
        ensure!(boundary.len() <= MAX_BOUNDARY_LEN, ContentError::multipart("boundary is too long"));

        let mut params = Params::new();
        for part in split_parts(&content, boundary)? {
            let Some(name) = part.name().map(str::to_owned) else {
                continue;
            };
            if let Some(param) = self.handler.handle_part(part).await? {
                params.append(name, param);
            }
        }
        Ok(params)
    }
}

fn split_parts(content: &Bytes, boundary: &str) -> Result<Vec<Part>, ContentError> {
    let delimiter = format!("--{boundary}");
    let next_delimiter = format!("\r\n--{boundary}");
    let next_finder = memmem::Finder::new(next_delimiter.as_bytes());

    let start = memmem::find(content, delimiter.as_bytes())
        .ok_or_else(|| ContentError::multipart("missing opening boundary"))?;
    let mut cursor = start + delimiter.len();
    let mut parts = vec![];

    loop {
        let rest = &content[cursor..];
        if rest.starts_with(b"--") {
            return Ok(parts);
        }

        // transport padding may follow the delimiter up to the line break
        let line_end = memmem::find(rest, CRLF).ok_or_else(|| ContentError::multipart("truncated content"))?;
        let part_start = cursor + line_end + CRLF.len();
        let part_len = next_finder
            .find(&content[part_start..])
            .ok_or_else(|| ContentError::multipart("missing closing boundary"))?;

        parts.push(parse_part(content.slice(part_start..part_start + part_len))?);
        cursor = part_start + part_len + next_delimiter.len();
    }
}

fn parse_part(raw: Bytes) -> Result<Part, ContentError> {
    let (head, content) = if raw.starts_with(CRLF) {
        (Bytes::new(), raw.slice(CRLF.len()..))
    } else {
        let end = memmem::find(&raw, HEADER_END).ok_or_else(|| ContentError::multipart("malformed part headers"))?;
        (raw.slice(..end), raw.slice(end + HEADER_END.len()..))
    };

    let mut headers = HeaderMap::new();
    for line in head.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let colon = memchr::memchr(b':', line).ok_or_else(|| ContentError::multipart("malformed part header"))?;
        let name = HeaderName::from_bytes(line[..colon].trim_ascii()).map_err(ContentError::multipart)?;
        let value = HeaderValue::from_bytes(line[colon + 1..].trim_ascii()).map_err(ContentError::multipart)?;
        headers.append(name, value);
    }

    let disposition = headers
        .get(header::CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .map(disposition_params)
        .unwrap_or_default();
    let param = |key: &str| disposition.iter().find(|(name, _)| name == key).map(|(_, value)| value.clone());

    let name = param("name").or_else(|| {
        headers.get("content-id").and_then(|value| value.to_str().ok()).map(|id| id.trim().to_owned())
    });
    let filename = param("filename")
        .filter(|filename| !filename.is_empty())
        .map(|filename| filename.rsplit(['/', '\\']).next().unwrap_or_default().to_owned());

    Ok(Part { headers, name, filename, content })
}

/// The `name=value` params of a `Content-Disposition` value; `;` inside quotes does not split.
fn disposition_params(value: &str) -> Vec<(String, String)> {
    let mut segments = vec![];
    let mut current = String::new();
    let mut quoted = false;

    for c in value.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ';' if !quoted => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    segments.push(current);

    segments
        .iter()
        .skip(1)
        .filter_map(|segment| segment.split_once('='))
        .map(|(name, value)| {
            let value = value.trim();
            let value = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value);
            (name.trim().to_ascii_lowercase(), value.to_owned())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn crlf(text: &str) -> Bytes {
        Bytes::from(text.replace('\n', "\r\n"))
    }

    fn form_data(boundary: &str) -> MediaValue {
        MediaValue::parse(&format!("multipart/form-data; boundary={boundary}"), '/')
    }

    struct TextOnly;

    #[async_trait]
    impl PartHandler for TextOnly {
        async fn handle_part(&self, part: Part) -> Result<Option<Param>, ContentError> {
            if part.is_file() {
                return Ok(Some(Param::Text(format!("file:{}", part.filename().unwrap_or_default()))));
            }
            Ok(Some(Param::Text(String::from_utf8_lossy(part.content()).into_owned())))
        }
    }

    #[test]
    fn test_disposition_params() {
        let params = disposition_params(r#"form-data; name="a;b"; filename=plain.txt"#);
        assert_eq!(params, vec![("name".into(), "a;b".into()), ("filename".into(), "plain.txt".into())]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_split_fields_and_strip_file_path() {
        let content = crlf(indoc! {r#"
            preamble
            --XyZ
            Content-Disposition: form-data; name="title"

            Hello multipart
            --XyZ
            Content-Disposition: form-data; name="upload"; filename="C:\Users\me\notes.txt"
            Content-Type: text/plain

            line one
            line two
            --XyZ
            Content-ID: fallback

            by id
            --XyZ--
        "#});

        let params = MultipartParser::new(TextOnly).parse(&form_data("XyZ"), content).await.unwrap();

        assert_eq!(params.get_str("title"), Some("Hello multipart"));
        assert_eq!(params.get_str("upload"), Some("file:notes.txt"));
        assert_eq!(params.get_str("fallback"), Some("by id"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_default_handler_saves_files() {
        let dir = std::env::temp_dir().join(format!("mach-multipart-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let content = crlf(indoc! {r#"
            --b
            Content-Disposition: form-data; name="doc"; filename="/tmp/report.csv"
            Content-Type: text/csv

            a,b
            1,2
            --b--
        "#});

        let parser = MultipartParser::new(DefaultPartHandler::new(&dir));
        let params = parser.parse(&form_data("\"b\""), content).await.unwrap();
        let file = params.get("doc").and_then(Param::as_file).unwrap().clone();

        assert_eq!(file.name.as_deref(), Some("report.csv"));
        assert_eq!(file.content_type.as_deref(), Some("text/csv"));
        assert_eq!(file.size, 8);
        assert!(file.path.starts_with(&dir));
        assert_eq!(tokio::fs::read(&file.path).await.unwrap(), b"a,b\r\n1,2");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_missing_boundary_or_terminator() {
        let parser = MultipartParser::new(TextOnly);
        let no_boundary = MediaValue::parse("multipart/form-data", '/');
        assert!(matches!(parser.parse(&no_boundary, Bytes::new()).await, Err(ContentError::Multipart { .. })));

        let truncated = crlf("--b\nContent-Disposition: form-data; name=\"a\"\n\nvalue");
        assert!(matches!(parser.parse(&form_data("b"), truncated).await, Err(ContentError::Multipart { .. })));
    }

    #[test]
    fn test_unique_file_names() {
        let first = unique_file_name().unwrap();
        let second = unique_file_name().unwrap();
        assert!(first.starts_with("mach-upload-"));
        assert_ne!(first, second);
    }
}
