//! Weighted media values, the tokens of the `Accept` family of headers.
//!
//! A media value has the shape `type[<sep>subtype][;name=value]*`, where the separator is `/`
//! for media types and `-` for language tags. The reserved `q` param carries the quality factor.

use std::fmt;

/// Name of the quality factor param.
pub const QUALITY_PARAM: &str = "q";

/// One parsed `type/subtype;params` token.
///
/// Params keep the order in which they were encountered, a repeated name overwrites the
/// earlier value in place.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaValue {
    media_type: String,
    subtype: Option<String>,
    params: Vec<(String, String)>,
}

impl MediaValue {
    pub fn new(media_type: impl Into<String>, subtype: Option<String>) -> Self {
        Self { media_type: media_type.into(), subtype, params: vec![] }
    }

    /// Parses a single token, splitting the first segment on `type_separator` at most once.
    pub fn parse(value: &str, type_separator: char) -> Self {
        let mut segments = value.split(';').map(str::trim);

        let (media_type, subtype) = match segments.next() {
            Some(first) => match first.split_once(type_separator) {
                Some((media_type, subtype)) => (media_type.trim().to_owned(), Some(subtype.trim().to_owned())),
                None => (first.to_owned(), None),
            },
            None => (String::new(), None),
        };

        let mut media_value = Self::new(media_type, subtype);
        for segment in segments.filter(|s| !s.is_empty()) {
            match segment.split_once('=') {
                Some((name, value)) => media_value.set_param(name.trim(), value.trim()),
                None => media_value.set_param(segment, ""),
            }
        }
        media_value
    }

    /// Parses a comma separated header value. An empty header yields an empty list.
    pub fn parse_list(header: &str, type_separator: char) -> Vec<Self> {
        header
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| Self::parse(token, type_separator))
            .collect()
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn subtype(&self) -> Option<&str> {
        self.subtype.as_deref()
    }

    /// `true` when the type is the `*` wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.media_type == "*"
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, value)| value.as_str())
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.params.push((name, value)),
        }
    }

    pub fn remove_param(&mut self, name: &str) -> Option<String> {
        let index = self.params.iter().position(|(n, _)| n == name)?;
        Some(self.params.remove(index).1)
    }

    /// The `q` param as given, out of range values included; `1` when absent, empty or
    /// unparsable.
    pub fn quality_factor(&self) -> f32 {
        match self.param(QUALITY_PARAM) {
            Some(q) if !q.is_empty() => q.trim().parse::<f32>().unwrap_or(1.0),
            _ => 1.0,
        }
    }

    pub fn stringify(&self, type_separator: char) -> String {
        let mut out = String::with_capacity(self.media_type.len() + 16);
        if self.media_type.is_empty() {
            out.push('*');
        } else {
            out.push_str(&self.media_type);
        }

        if let Some(subtype) = &self.subtype {
            out.push(type_separator);
            out.push_str(subtype);
        }

        for (name, value) in &self.params {
            out.push(';');
            out.push_str(name);
            if !value.is_empty() {
                out.push('=');
                out.push_str(value);
            }
        }
        out
    }

    /// Renders the value without its `q` param, the basis for specificity comparisons.
    pub fn stringify_without_quality_factor(&self, type_separator: char) -> String {
        let mut value = self.clone();
        value.remove_param(QUALITY_PARAM);
        value.stringify(type_separator)
    }
}

impl fmt::Display for MediaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stringify('/'))
    }
}
