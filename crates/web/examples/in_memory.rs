//! Drives a full stack with in-memory requests, no socket involved.
//!
//! ```sh
//! cargo run -p mach-web --example in_memory
//! ```

use futures::FutureExt;
use http::{Method, Request, StatusCode};
use mach_web::middleware::{
    Catch, ContentType, Gzip, Logger, MemoryStore, MethodOverride, Modified, ParamsParser, Router, Sessions,
};
use mach_web::{Connection, Content, IntoReply, Stack, Transport, app_fn};
use serde_json::json;
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

fn router() -> Result<Router, mach_web::Error> {
    Router::builder()
        .get(
            "/",
            app_fn(|conn| {
                async move {
                    let visits = count_visit(conn);
                    Ok(format!("hello, this is visit {visits}\n").into_reply())
                }
                .boxed()
            }),
        )
        .get(
            "/users/:id",
            app_fn(|conn| {
                async move {
                    let id = conn.params_mut().get_str("id").unwrap_or_default().to_owned();
                    conn.json(StatusCode::OK, &json!({ "id": id }))
                }
                .boxed()
            }),
        )
        .put(
            "/users/:id",
            app_fn(|conn| {
                async move {
                    let name = conn.params_mut().get_str("name").unwrap_or("anonymous").to_owned();
                    Ok((StatusCode::ACCEPTED, format!("renamed to {name}\n")).into_reply())
                }
                .boxed()
            }),
        )
        .build()
}

fn count_visit(conn: &mut Connection) -> u64 {
    let Some(session) = conn.session.as_mut() else {
        return 0;
    };
    let visits = session.get("visits").and_then(serde_json::Value::as_u64).unwrap_or(0) + 1;
    session.insert("visits", visits);
    visits
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let store = MemoryStore::with_ttl(Duration::from_secs(30 * 60));
    store.start_pruning(Duration::from_secs(60));

    let router = match router() {
        Ok(router) => router,
        Err(e) => {
            error!(cause = %e, "invalid routes");
            return;
        }
    };
    let app = Stack::new()
        .with(Logger::new())
        .with(Catch::new())
        .with(Gzip::new())
        .with(Modified::new())
        .with(ContentType::new())
        .with(Sessions::builder(store).expire_after(30 * 60).build())
        .with(ParamsParser::new().max_length(64 * 1024))
        .with(MethodOverride::new())
        .build(router)
        .expect("stack should build");
    let transport = Transport::builder().app(app).build().expect("app is set");

    let first = transport.handle(request(Method::GET, "/", None, ""), None).await;
    let cookie = first.headers().get(http::header::SET_COOKIE).and_then(|v| v.to_str().ok()).map(str::to_owned);
    info!(status = %first.status(), cookie = ?cookie, "first visit");

    let session = cookie.as_deref().and_then(|c| c.split(';').next()).unwrap_or_default().to_owned();
    let second = transport.handle(request(Method::GET, "/", Some(&session), ""), None).await;
    print_body("second visit", second).await;

    let user = transport.handle(request(Method::GET, "/users/42", None, ""), None).await;
    print_body("user", user).await;

    let renamed = transport.handle(request(Method::POST, "/users/42", None, "_method=PUT&name=ada"), None).await;
    print_body("method override", renamed).await;

    let missing = transport.handle(request(Method::GET, "/nowhere", None, ""), None).await;
    info!(status = %missing.status(), "missing route");
}

fn request(method: Method, uri: &str, cookie: Option<&str>, form: &'static str) -> Request<Content> {
    let mut builder = Request::builder().method(method).uri(uri).header("host", "localhost:3000");
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    if !form.is_empty() {
        builder = builder.header("content-type", "application/x-www-form-urlencoded");
    }
    builder.body(Content::from(form)).expect("valid request")
}

async fn print_body(label: &str, response: http::Response<Content>) {
    let status = response.status();
    match response.into_body().buffer(None).await {
        Ok(body) => info!(%status, body = %String::from_utf8_lossy(&body).trim_end(), "{label}"),
        Err(e) => error!(cause = %e, "{label}: reading body failed"),
    }
}
