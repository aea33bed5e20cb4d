//! Compiles declared middleware, mappings and routes into a single app.

use crate::app::{App, BoxApp, Middleware, Wrapped};
use crate::error::Error;
use crate::middleware::{Mapper, Router};
use std::iter::Peekable;
use std::sync::Arc;

enum Layer {
    Middleware(Arc<dyn Middleware>),
    Map(String, BoxApp),
    Route(String, BoxApp),
}

/// Layers in declaration order, the first declared being the outermost.
///
/// Consecutive `map` declarations form one [`Mapper`] and consecutive `route` declarations one
/// [`Router`]. Requests they dispatch skip every layer declared after them; unmatched requests
/// continue down the stack.
///
/// ```
/// use http::StatusCode;
/// use mach_web::middleware::{Catch, Logger};
/// use mach_web::Stack;
///
/// let app = Stack::new()
///     .with(Logger::new())
///     .with(Catch::new())
///     .route("GET /health", StatusCode::NO_CONTENT)
///     .build(StatusCode::NOT_FOUND)
///     .unwrap();
/// ```
#[derive(Default)]
pub struct Stack {
    layers: Vec<Layer>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.layers.push(Layer::Middleware(Arc::new(middleware)));
        self
    }

    /// Dispatches requests under `prefix` (`/path` or `http://host/path`) to `app`.
    pub fn map<A: App + 'static>(mut self, prefix: impl Into<String>, app: A) -> Self {
        self.layers.push(Layer::Map(prefix.into(), Arc::new(app)));
        self
    }

    /// Dispatches requests matching `pattern` (for example `GET /posts/:id`) to `app`.
    pub fn route<A: App + 'static>(mut self, pattern: impl Into<String>, app: A) -> Self {
        self.layers.push(Layer::Route(pattern.into(), Arc::new(app)));
        self
    }

    /// Folds the layers around `app`, innermost first. Invalid patterns are reported here.
    pub fn build<A: App + 'static>(self, app: A) -> Result<BoxApp, Error> {
        let mut app: BoxApp = Arc::new(app);
        let mut layers = self.layers.into_iter().rev().peekable();

        while let Some(layer) = layers.next() {
            app = match layer {
                Layer::Middleware(middleware) => Arc::new(Wrapped::new(middleware, app)),
                Layer::Map(prefix, target) => {
                    let mut mapper = Mapper::builder();
                    for (prefix, target) in take_run(&mut layers, (prefix, target), Kind::Map) {
                        mapper = mapper.map(prefix, target);
                    }
                    Arc::new(mapper.default_app(app).build()?)
                }
                Layer::Route(pattern, target) => {
                    let mut router = Router::builder();
                    for (pattern, target) in take_run(&mut layers, (pattern, target), Kind::Route) {
                        router = router.route(pattern, target);
                    }
                    Arc::new(router.default_app(app).build()?)
                }
            };
        }
        Ok(app)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Map,
    Route,
}

impl Layer {
    fn kind(&self) -> Option<Kind> {
        match self {
            Self::Middleware(_) => None,
            Self::Map(..) => Some(Kind::Map),
            Self::Route(..) => Some(Kind::Route),
        }
    }
}

/// Collects the run of `kind` layers following `first` (the layers iterate in reverse) and
/// returns it in declaration order.
fn take_run<I>(layers: &mut Peekable<I>, first: (String, BoxApp), kind: Kind) -> Vec<(String, BoxApp)>
where
    I: Iterator<Item = Layer>,
{
    let mut run = vec![first];
    while let Some(layer) = layers.next_if(|layer| layer.kind() == Some(kind)) {
        if let Layer::Map(key, app) | Layer::Route(key, app) = layer {
            run.push((key, app));
        }
    }
    run.reverse();
    run
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack").field("layers", &self.layers.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use crate::reply::Reply;
    use crate::test_support::conn;
    use crate::{Connection, app_fn};
    use async_trait::async_trait;
    use futures::FutureExt;
    use http::{HeaderValue, Method, StatusCode};

    struct Tag(&'static str);

    #[async_trait]
    impl Middleware for Tag {
        async fn handle(&self, conn: &mut Connection, next: &dyn App) -> AppResult {
            conn.call(next).await?;
            conn.response.headers_mut().append("x-tag", HeaderValue::from_static(self.0));
            Ok(Reply::Unchanged)
        }
    }

    fn tags(conn: &Connection) -> Vec<&str> {
        conn.response.headers().get_all("x-tag").iter().filter_map(|v| v.to_str().ok()).collect()
    }

    fn stack() -> BoxApp {
        Stack::new()
            .with(Tag("outer"))
            .route("GET /a", app_fn(|conn| async move { Ok(conn.text(StatusCode::OK, "a")) }.boxed()))
            .route("GET /b", StatusCode::ACCEPTED)
            .with(Tag("inner"))
            .map("/files", StatusCode::IM_A_TEAPOT)
            .build(StatusCode::NOT_FOUND)
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_routes_skip_layers_declared_after() {
        let app = stack();

        let mut routed = conn(Method::GET, "/a");
        routed.call(app.as_ref()).await.unwrap();
        assert_eq!(routed.status, StatusCode::OK);
        assert_eq!(tags(&routed), vec!["outer"]);

        let mut second = conn(Method::GET, "/b");
        second.call(app.as_ref()).await.unwrap();
        assert_eq!(second.status, StatusCode::ACCEPTED);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_unmatched_requests_continue_down_the_stack() {
        let app = stack();

        let mut mapped = conn(Method::GET, "/files/readme");
        mapped.call(app.as_ref()).await.unwrap();
        assert_eq!(mapped.status, StatusCode::IM_A_TEAPOT);
        assert_eq!(tags(&mapped), vec!["inner", "outer"]);

        let mut missing = conn(Method::GET, "/nowhere");
        missing.call(app.as_ref()).await.unwrap();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert_eq!(tags(&missing), vec!["inner", "outer"]);
    }

    #[test]
    fn test_invalid_route_is_a_usage_error() {
        let result = Stack::new().route("GET /posts/:", StatusCode::OK).build(StatusCode::NOT_FOUND);
        assert!(matches!(result, Err(Error::Usage { .. })));
    }
}
