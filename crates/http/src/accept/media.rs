use super::{HeaderValues, Negotiator, eq_token};
use crate::MediaValue;
use std::cmp::Reverse;

/// The `Accept` header.
#[derive(Debug, Clone)]
pub struct Accept {
    values: HeaderValues,
}

impl Accept {
    pub fn new(header: impl Into<String>) -> Self {
        Self { values: HeaderValues::new(header.into(), '/') }
    }

    pub fn header(&self) -> &str {
        self.values.raw()
    }

    pub fn media_values(&self) -> &[MediaValue] {
        self.values.get()
    }

    /// Resolves the quality of `media_type` (which may carry params, e.g. `text/html;level=1`).
    ///
    /// Among the matching header entries the most specific one wins, specificity being the
    /// length of the entry rendered without its `q` param.
    pub fn quality_factor_for_media_type(&self, media_type: &str) -> f32 {
        let values = self.values.get();
        if values.is_empty() {
            return 1.0;
        }

        let candidate = MediaValue::parse(media_type, '/');
        let mut matches: Vec<&MediaValue> = values.iter().filter(|value| matches(value, &candidate)).collect();
        matches.sort_by_cached_key(|value| Reverse(value.stringify_without_quality_factor('/').len()));

        matches.first().map_or(0.0, |value| value.quality_factor())
    }

    pub fn accepts_media_type(&self, media_type: &str) -> bool {
        self.quality_factor_for_media_type(media_type) != 0.0
    }
}

impl Negotiator for Accept {
    fn quality_factor(&self, candidate: &str) -> f32 {
        self.quality_factor_for_media_type(candidate)
    }
}

fn matches(value: &MediaValue, candidate: &MediaValue) -> bool {
    let type_matches = value.is_wildcard() || eq_token(value.media_type(), candidate.media_type());
    let subtype_matches = match (value.subtype(), candidate.subtype()) {
        (Some("*"), _) => true,
        (Some(subtype), Some(candidate_subtype)) => eq_token(subtype, candidate_subtype),
        (None, None) => true,
        _ => false,
    };

    type_matches
        && subtype_matches
        && value
            .params()
            .filter(|(name, _)| *name != crate::media_value::QUALITY_PARAM)
            .all(|(name, param)| candidate.param(name) == Some(param))
}
