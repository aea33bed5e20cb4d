//! Parameters extracted from a query string or from parsed message content.

use crate::query::{Query, QueryValue};
use serde_json::Value;
use std::path::PathBuf;

/// Descriptor of an uploaded part that was written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub name: Option<String>,
    pub content_type: Option<String>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(String),
    List(Vec<String>),
    Json(Value),
    File(UploadedFile),
}

impl Param {
    /// The text value, or the first entry of a list.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::List(list) => list.first().map(String::as_str),
            Self::Json(Value::String(text)) => Some(text),
            Self::Json(_) | Self::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&UploadedFile> {
        match self {
            Self::File(file) => Some(file),
            _ => None,
        }
    }
}

impl From<QueryValue> for Param {
    fn from(value: QueryValue) -> Self {
        match value {
            QueryValue::Single(text) => Self::Text(text),
            QueryValue::Multiple(list) => Self::List(list),
        }
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Json(other),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Param)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, param)| param)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Param::as_str)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn insert(&mut self, name: impl Into<String>, param: Param) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = param,
            None => self.entries.push((name, param)),
        }
    }

    /// Adds `param`; text values given under the same name accumulate into a list.
    pub fn append(&mut self, name: impl Into<String>, param: Param) {
        let name = name.into();
        let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) else {
            self.entries.push((name, param));
            return;
        };

        match (&mut entry.1, param) {
            (Param::List(list), Param::Text(text)) => list.push(text),
            (Param::Text(existing), Param::Text(text)) => entry.1 = Param::List(vec![std::mem::take(existing), text]),
            (slot, param) => *slot = param,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Param> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    /// Merges `other` into `self`; entries of `other` override.
    pub fn merge(&mut self, other: Params) {
        for (name, param) in other.entries {
            self.insert(name, param);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.entries.iter().map(|(name, param)| (name.as_str(), param))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Query> for Params {
    fn from(query: Query) -> Self {
        let mut params = Self::new();
        for (name, value) in query.iter() {
            params.insert(name, Param::from(value.clone()));
        }
        params
    }
}

impl<N: Into<String>> FromIterator<(N, Param)> for Params {
    fn from_iter<T: IntoIterator<Item = (N, Param)>>(iter: T) -> Self {
        let mut params = Self::new();
        for (name, param) in iter {
            params.append(name, param);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_accumulates_text() {
        let mut params = Params::new();
        params.append("tag", Param::Text("a".into()));
        params.append("tag", Param::Text("b".into()));
        params.append("tag", Param::Text("c".into()));
        assert_eq!(params.get("tag"), Some(&Param::List(vec!["a".into(), "b".into(), "c".into()])));
        assert_eq!(params.get_str("tag"), Some("a"));
    }

    #[test]
    fn test_from_query() {
        let params = Params::from(Query::parse("a=1&b=2&a=3"));
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("a"), Some(&Param::List(vec!["1".into(), "3".into()])));
    }

    #[test]
    fn test_merge_overrides() {
        let mut params = Params::from(Query::parse("a=1&b=2"));
        params.merge(Params::from(Query::parse("b=3")));
        assert_eq!(params.get_str("b"), Some("3"));
        assert_eq!(params.get_str("a"), Some("1"));
    }
}
