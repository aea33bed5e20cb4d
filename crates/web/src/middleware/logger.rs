use crate::app::{App, Middleware};
use crate::connection::Connection;
use crate::error::{AppResult, Interrupt};
use crate::reply::Reply;
use async_trait::async_trait;
use http::StatusCode;
use http::header;
use std::time::Instant;
use tracing::info;

/// Logs one line per request in the common log format, followed by the elapsed time:
///
/// ```text
/// 127.0.0.1 - alice [10/Oct/2026:13:55:36 +0000] "GET /a HTTP/1.1" 200 2326 4ms
/// ```
///
/// A halted chain is logged with the status and length of the halt reply, a failed one as
/// `500`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logger;

impl Logger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for Logger {
    async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult {
        let start = Instant::now();
        let result = conn.call(next).await;
        let elapsed_ms = start.elapsed().as_millis();

        let (status, length) = match &result {
            Ok(()) => (conn.status, response_length(conn)),
            Err(Interrupt::Halt(reply)) => {
                let length = reply.content().map_or_else(|| response_length(conn), |content| content.length());
                (reply.status().unwrap_or(conn.status), length)
            }
            Err(Interrupt::Error(_)) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };
        info!("{}", log_line(conn, status, length, elapsed_ms));
        result.map(|()| Reply::Unchanged)
    }
}

fn response_length(conn: &Connection) -> Option<u64> {
    conn.response
        .header(header::CONTENT_LENGTH)
        .and_then(|length| length.parse().ok())
        .or_else(|| conn.response.content().length())
}

fn log_line(conn: &Connection, status: StatusCode, length: Option<u64>, elapsed_ms: u128) -> String {
    let remote = conn.remote_addr.map_or_else(|| "-".to_owned(), |addr| addr.ip().to_string());
    let user = conn.remote_user.as_deref().unwrap_or("-");
    let date = chrono::Local::now().format("%d/%b/%Y:%H:%M:%S %z");
    let length = length.map_or_else(|| "-".to_owned(), |length| length.to_string());

    format!(
        "{remote} - {user} [{date}] \"{} {} {:?}\" {} {length} {elapsed_ms}ms",
        conn.method,
        conn.location.path(),
        conn.version,
        status.as_u16(),
    )
}
