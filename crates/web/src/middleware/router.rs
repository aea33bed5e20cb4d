//! Pattern based dispatch.
//!
//! A pattern is a pathname with `:name` segments (any run of characters but `./?#`) and `*`
//! splats (non-greedy, possibly empty), optionally prefixed with a method: `GET /posts/:id`.
//! Routes bound to the request method are tried first, in registration order, then routes
//! without a method. The first match wins and its captures are merged into the params.

use crate::app::{App, BoxApp};
use crate::connection::Connection;
use crate::error::{AppResult, Error};
use async_trait::async_trait;
use http::{Method, StatusCode};
use mach_http::Param;
use regex::Regex;
use std::sync::Arc;

const SPLAT: &str = "splat";

struct Route {
    method: Option<Method>,
    regex: Regex,
    names: Vec<String>,
    app: BoxApp,
}

impl Route {
    fn compile(pattern: &str, app: BoxApp) -> Result<Self, Error> {
        let (method, path) = split_method(pattern)?;
        let (regex, names) = compile_path(path).map_err(|reason| Error::usage(format!("route {pattern:?}: {reason}")))?;
        Ok(Self { method, regex, names, app })
    }

    fn captures(&self, pathname: &str) -> Option<Vec<(String, String)>> {
        let captures = self.regex.captures(pathname)?;
        Some(
            self.names
                .iter()
                .zip(captures.iter().skip(1))
                .map(|(name, value)| (name.clone(), value.map_or("", |m| m.as_str()).to_owned()))
                .collect(),
        )
    }
}

fn split_method(pattern: &str) -> Result<(Option<Method>, &str), Error> {
    let pattern = pattern.trim();
    match pattern.split_once(' ') {
        Some((method, path)) if !method.starts_with('/') => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|e| Error::usage(format!("route {pattern:?}: {e}")))?;
            Ok((Some(method), path.trim()))
        }
        _ => Ok((None, pattern)),
    }
}

fn compile_path(path: &str) -> Result<(Regex, Vec<String>), String> {
    let mut source = String::from("^");
    let mut names = vec![];
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ':' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek().filter(|next| next.is_ascii_alphanumeric() || **next == '_') {
                    name.push(next);
                    chars.next();
                }
                if name.is_empty() {
                    return Err("named segment without a name".into());
                }
                source.push_str("([^./?#]+)");
                names.push(name);
            }
            '*' => {
                source.push_str("(.*?)");
                names.push(SPLAT.to_owned());
            }
            _ => source.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');

    let regex = Regex::new(&source).map_err(|e| e.to_string())?;
    Ok((regex, names))
}

pub struct Router {
    routes: Vec<Route>,
    default_app: BoxApp,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    fn find(&self, method: &Method, pathname: &str) -> Option<(&Route, Vec<(String, String)>)> {
        // HEAD falls back to GET routes
        let bound = |route: &&Route| {
            route.method.as_ref().is_some_and(|m| m == method || (*method == Method::HEAD && *m == Method::GET))
        };
        let exact = self.routes.iter().filter(|route| route.method.as_ref() == Some(method));
        let head_fallback = self.routes.iter().filter(bound).filter(|route| route.method.as_ref() != Some(method));
        let any = self.routes.iter().filter(|route| route.method.is_none());

        exact
            .chain(head_fallback)
            .chain(any)
            .find_map(|route| route.captures(pathname).map(|captures| (route, captures)))
    }
}

#[async_trait]
impl App for Router {
    async fn call(&self, conn: &mut Connection) -> AppResult {
        let Some((route, captures)) = self.find(&conn.method, conn.pathname()) else {
            return self.default_app.call(conn).await;
        };

        let params = conn.params_mut();
        for (name, value) in captures {
            params.append(name, Param::Text(value));
        }
        route.app.call(conn).await
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").field("routes", &self.routes.len()).finish_non_exhaustive()
    }
}

pub struct RouterBuilder {
    routes: Vec<(String, BoxApp)>,
    default_app: Option<BoxApp>,
}

impl RouterBuilder {
    fn new() -> Self {
        Self { routes: vec![], default_app: None }
    }

    pub fn route<A: App + 'static>(mut self, pattern: impl Into<String>, app: A) -> Self {
        self.routes.push((pattern.into(), Arc::new(app)));
        self
    }

    /// The app for unmatched requests, a `404` by default.
    pub fn default_app<A: App + 'static>(mut self, app: A) -> Self {
        self.default_app = Some(Arc::new(app));
        self
    }

    /// Compiles every pattern; the first invalid one is reported as a usage error.
    pub fn build(self) -> Result<Router, Error> {
        let routes =
            self.routes.into_iter().map(|(pattern, app)| Route::compile(&pattern, app)).collect::<Result<_, _>>()?;
        let default_app = self.default_app.unwrap_or_else(|| Arc::new(StatusCode::NOT_FOUND));
        Ok(Router { routes, default_app })
    }
}

macro_rules! method_route {
    ($method:ident, $name:literal) => {
        #[doc = concat!("Registers a `", $name, "` route.")]
        pub fn $method<A: App + 'static>(self, path: &str, app: A) -> Self {
            self.route(format!("{} {path}", $name), app)
        }
    };
}

impl RouterBuilder {
    method_route!(get, "GET");
    method_route!(post, "POST");
    method_route!(put, "PUT");
    method_route!(delete, "DELETE");
    method_route!(patch, "PATCH");
    method_route!(head, "HEAD");
    method_route!(options, "OPTIONS");
}

impl std::fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let patterns: Vec<&str> = self.routes.iter().map(|(pattern, _)| pattern.as_str()).collect();
        f.debug_struct("RouterBuilder").field("routes", &patterns).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_fn;
    use crate::test_support::conn;
    use futures::FutureExt;

    fn echo_id() -> impl App {
        app_fn(|conn| {
            async move {
                let id = conn.params.as_ref().and_then(|p| p.get_str("id")).unwrap_or_default().to_owned();
                Ok(conn.text(StatusCode::OK, id))
            }
            .boxed()
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_named_segment() {
        let router = Router::builder().route("GET /posts/:id", echo_id()).build().unwrap();

        let mut get = conn(Method::GET, "/posts/42");
        get.call(&router).await.unwrap();
        assert_eq!(get.status, StatusCode::OK);
        assert_eq!(get.params.as_ref().and_then(|p| p.get_str("id")), Some("42"));

        let mut put = conn(Method::PUT, "/posts/42");
        put.call(&router).await.unwrap();
        assert_eq!(put.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_named_segment_stops_at_dot() {
        let router = Router::builder().get("/files/:name.:format", echo_id()).build().unwrap();

        let mut conn = conn(Method::GET, "/files/report.csv");
        conn.call(&router).await.unwrap();
        let params = conn.params.unwrap();
        assert_eq!(params.get_str("name"), Some("report"));
        assert_eq!(params.get_str("format"), Some("csv"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_method_routes_before_any() {
        let router = Router::builder()
            .route("/items/*", StatusCode::ACCEPTED)
            .post("/items/new", StatusCode::CREATED)
            .build()
            .unwrap();

        let mut post = conn(Method::POST, "/items/new");
        post.call(&router).await.unwrap();
        assert_eq!(post.status, StatusCode::CREATED);

        let mut get = conn(Method::GET, "/items/a/b");
        get.call(&router).await.unwrap();
        assert_eq!(get.status, StatusCode::ACCEPTED);
        assert_eq!(get.params.unwrap().get_str(SPLAT), Some("a/b"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_first_match_wins_and_head_uses_get() {
        let router = Router::builder()
            .get("/a/:x", StatusCode::OK)
            .get("/a/b", StatusCode::GONE)
            .default_app(StatusCode::IM_A_TEAPOT)
            .build()
            .unwrap();

        let mut first = conn(Method::GET, "/a/b");
        first.call(&router).await.unwrap();
        assert_eq!(first.status, StatusCode::OK);

        let mut head = conn(Method::HEAD, "/a/b");
        head.call(&router).await.unwrap();
        assert_eq!(head.status, StatusCode::OK);

        let mut other = conn(Method::GET, "/b");
        other.call(&router).await.unwrap();
        assert_eq!(other.status, StatusCode::IM_A_TEAPOT);
    }

    #[test]
    fn test_literals_are_escaped() {
        let (regex, names) = compile_path("/a+b/(c)").unwrap();
        assert!(regex.is_match("/a+b/(c)"));
        assert!(!regex.is_match("/aab/c"));
        assert!(names.is_empty());
        assert!(compile_path("/x/:").is_err());
    }
}
