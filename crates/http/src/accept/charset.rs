use super::{HeaderValues, Negotiator, eq_token, matching_token};

const ISO_8859_1: &str = "iso-8859-1";

/// The `Accept-Charset` header.
///
/// `iso-8859-1` is acceptable at quality `1` unless the header names it, or a `*`, explicitly.
#[derive(Debug, Clone)]
pub struct AcceptCharset {
    values: HeaderValues,
}

impl AcceptCharset {
    pub fn new(header: impl Into<String>) -> Self {
        Self { values: HeaderValues::new(header.into(), '/') }
    }

    pub fn header(&self) -> &str {
        self.values.raw()
    }

    pub fn quality_factor_for_charset(&self, charset: &str) -> f32 {
        let values = self.values.get();
        if values.is_empty() {
            return 1.0;
        }

        let matches = matching_token(values, charset);
        match matches.first() {
            Some(value) => value.quality_factor(),
            None if eq_token(charset, ISO_8859_1) => 1.0,
            None => 0.0,
        }
    }

    pub fn accepts_charset(&self, charset: &str) -> bool {
        self.quality_factor_for_charset(charset) != 0.0
    }
}

impl Negotiator for AcceptCharset {
    fn quality_factor(&self, candidate: &str) -> f32 {
        self.quality_factor_for_charset(candidate)
    }
}
