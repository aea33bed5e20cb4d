//! Dispatch by pathname prefix, optionally bound to a host: `/admin`, `http://example.com/`.
//!
//! The longest matching prefix wins. The downstream app sees the prefix appended to the
//! connection's basename, so [`Connection::pathname`] is relative to the mapping.

use crate::app::{App, BoxApp};
use crate::connection::Connection;
use crate::error::{AppResult, Error};
use async_trait::async_trait;
use http::StatusCode;
use mach_http::Location;
use std::sync::Arc;

struct Mapping {
    hostname: Option<String>,
    prefix: String,
    app: BoxApp,
}

impl Mapping {
    fn parse(pattern: &str, app: BoxApp) -> Result<Self, Error> {
        let (hostname, pathname) = if pattern.starts_with('/') {
            (None, pattern.to_owned())
        } else {
            let location = Location::parse(pattern)?;
            let hostname = location
                .hostname()
                .map(str::to_owned)
                .ok_or_else(|| Error::usage(format!("mapping {pattern:?} needs a host or a leading '/'")))?;
            (Some(hostname), location.pathname().unwrap_or("/").to_owned())
        };

        Ok(Self { hostname, prefix: pathname.trim_end_matches('/').to_owned(), app })
    }

    fn matches(&self, hostname: Option<&str>, pathname: &str) -> bool {
        if let Some(expected) = &self.hostname {
            if !hostname.is_some_and(|hostname| hostname.eq_ignore_ascii_case(expected)) {
                return false;
            }
        }
        match pathname.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

pub struct Mapper {
    mappings: Vec<Mapping>,
    default_app: BoxApp,
}

impl Mapper {
    pub fn builder() -> MapperBuilder {
        MapperBuilder::new()
    }
}

#[async_trait]
impl App for Mapper {
    async fn call(&self, conn: &mut Connection) -> AppResult {
        let hostname = conn.location.hostname();
        let Some(mapping) = self.mappings.iter().find(|mapping| mapping.matches(hostname, conn.pathname())) else {
            return self.default_app.call(conn).await;
        };

        let basename = conn.basename.clone();
        conn.basename = format!("{basename}{}", mapping.prefix);
        let result = mapping.app.call(conn).await;
        conn.basename = basename;
        result
    }
}

impl std::fmt::Debug for Mapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper").field("mappings", &self.mappings.len()).finish_non_exhaustive()
    }
}

pub struct MapperBuilder {
    mappings: Vec<(String, BoxApp)>,
    default_app: Option<BoxApp>,
}

impl MapperBuilder {
    fn new() -> Self {
        Self { mappings: vec![], default_app: None }
    }

    pub fn map<A: App + 'static>(mut self, pattern: impl Into<String>, app: A) -> Self {
        self.mappings.push((pattern.into(), Arc::new(app)));
        self
    }

    /// The app for unmatched requests, a `404` by default.
    pub fn default_app<A: App + 'static>(mut self, app: A) -> Self {
        self.default_app = Some(Arc::new(app));
        self
    }

    pub fn build(self) -> Result<Mapper, Error> {
        let mut mappings = self
            .mappings
            .into_iter()
            .map(|(pattern, app)| Mapping::parse(&pattern, app))
            .collect::<Result<Vec<_>, _>>()?;
        // longest first; host bound mappings win ties
        mappings.sort_by_key(|mapping| std::cmp::Reverse((mapping.prefix.len(), mapping.hostname.is_some())));
        let default_app = self.default_app.unwrap_or_else(|| Arc::new(StatusCode::NOT_FOUND));
        Ok(Mapper { mappings, default_app })
    }
}

impl std::fmt::Debug for MapperBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefixes: Vec<&str> = self.mappings.iter().map(|(prefix, _)| prefix.as_str()).collect();
        f.debug_struct("MapperBuilder").field("mappings", &prefixes).finish_non_exhaustive()
    }
}
