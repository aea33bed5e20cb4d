use super::{HeaderValues, Negotiator, eq_token};
use crate::MediaValue;
use std::cmp::Reverse;

/// The `Accept-Language` header. Tags split on `-` into a primary subtag and a region subtag.
#[derive(Debug, Clone)]
pub struct AcceptLanguage {
    values: HeaderValues,
}

impl AcceptLanguage {
    pub fn new(header: impl Into<String>) -> Self {
        Self { values: HeaderValues::new(header.into(), '-') }
    }

    pub fn header(&self) -> &str {
        self.values.raw()
    }

    /// A range without a region (`en`) matches every region of that language; `*` always
    /// has the least precedence.
    pub fn quality_factor_for_language(&self, language: &str) -> f32 {
        let values = self.values.get();
        if values.is_empty() {
            return 1.0;
        }

        let candidate = MediaValue::parse(language, '-');
        let mut matches: Vec<&MediaValue> = values.iter().filter(|value| matches(value, &candidate)).collect();
        matches.sort_by_cached_key(|value| {
            (value.is_wildcard(), Reverse(value.stringify_without_quality_factor('-').len()))
        });

        matches.first().map_or(0.0, |value| value.quality_factor())
    }

    pub fn accepts_language(&self, language: &str) -> bool {
        self.quality_factor_for_language(language) != 0.0
    }
}

impl Negotiator for AcceptLanguage {
    fn quality_factor(&self, candidate: &str) -> f32 {
        self.quality_factor_for_language(candidate)
    }
}

fn matches(value: &MediaValue, candidate: &MediaValue) -> bool {
    let primary_matches = value.is_wildcard() || eq_token(value.media_type(), candidate.media_type());
    let region_matches = match value.subtype() {
        None | Some("") => true,
        Some(region) => candidate.subtype().is_some_and(|candidate_region| eq_token(region, candidate_region)),
    };
    primary_matches && region_matches
}
