use crate::app::{App, Middleware};
use crate::connection::Connection;
use crate::error::AppResult;
use crate::reply::IntoReply;
use async_trait::async_trait;
use http::StatusCode;
use mach_http::Params;
use mach_http::parser::ContentParsers;
use tracing::trace;

/// Fills [`Connection::params`] from the query string and the parsed request content, the
/// content winning on conflicts.
///
/// Content over `max_length` is answered with `413`, unparsable content with `400`.
#[derive(Debug, Clone, Default)]
pub struct ParamsParser {
    max_length: Option<usize>,
    parsers: ContentParsers,
}

impl ParamsParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn parsers(mut self, parsers: ContentParsers) -> Self {
        self.parsers = parsers;
        self
    }
}

#[async_trait]
impl Middleware for ParamsParser {
    async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult {
        let mut params = Params::from(conn.location.query());

        match conn.request.parse_content_with(&self.parsers, self.max_length).await {
            Ok(content_params) => params.merge(content_params),
            Err(e) if e.is_max_length_exceeded() => return Ok(StatusCode::PAYLOAD_TOO_LARGE.into_reply()),
            Err(e) => {
                trace!(cause = %e, "unparsable request content");
                return Ok(StatusCode::BAD_REQUEST.into_reply());
            }
        }

        conn.params_mut().merge(params);
        next.call(conn).await
    }
}
