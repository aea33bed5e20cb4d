use crate::app::{App, Middleware};
use crate::connection::Connection;
use crate::error::AppResult;
use async_trait::async_trait;
use http::Method;

const HEADER: &str = "x-http-method-override";
const PARAM: &str = "_method";

/// Lets `POST` requests stand in for other methods through the `X-HTTP-Method-Override` header
/// or a `_method` param, read from the parsed params first and the query second.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodOverride;

impl MethodOverride {
    pub fn new() -> Self {
        Self
    }
}

fn requested_method(conn: &Connection) -> Option<String> {
    if let Some(method) = conn.request.header(HEADER) {
        return Some(method.to_owned());
    }
    if let Some(method) = conn.params.as_ref().and_then(|params| params.get_str(PARAM)) {
        return Some(method.to_owned());
    }
    conn.location.query().first(PARAM).map(str::to_owned)
}

#[async_trait]
impl Middleware for MethodOverride {
    async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult {
        if conn.method == Method::POST {
            let replacement = requested_method(conn)
                .and_then(|method| Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes()).ok());
            if let Some(method) = replacement {
                conn.method = method;
            }
        }
        next.call(conn).await
    }
}
