use super::{HeaderValues, Negotiator, matching_token};

/// The `Accept-Encoding` header. Nothing is implicitly acceptable once the header is present.
#[derive(Debug, Clone)]
pub struct AcceptEncoding {
    values: HeaderValues,
}

impl AcceptEncoding {
    pub fn new(header: impl Into<String>) -> Self {
        Self { values: HeaderValues::new(header.into(), '/') }
    }

    pub fn header(&self) -> &str {
        self.values.raw()
    }

    pub fn quality_factor_for_encoding(&self, encoding: &str) -> f32 {
        let values = self.values.get();
        if values.is_empty() {
            return 1.0;
        }

        matching_token(values, encoding).first().map_or(0.0, |value| value.quality_factor())
    }

    pub fn accepts_encoding(&self, encoding: &str) -> bool {
        self.quality_factor_for_encoding(encoding) != 0.0
    }
}

impl Negotiator for AcceptEncoding {
    fn quality_factor(&self, candidate: &str) -> f32 {
        self.quality_factor_for_encoding(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_header() {
        assert_eq!(AcceptEncoding::new("").quality_factor_for_encoding("gzip"), 1.0);
    }

    #[test]
    fn test_no_implicit_identity() {
        let accept = AcceptEncoding::new("gzip");
        assert_eq!(accept.quality_factor_for_encoding("gzip"), 1.0);
        assert_eq!(accept.quality_factor_for_encoding("identity"), 0.0);
    }

    #[test]
    fn test_wildcard_and_exclusion() {
        let accept = AcceptEncoding::new("gzip;q=0, *;q=0.4");
        assert!(!accept.accepts_encoding("gzip"));
        assert_eq!(accept.quality_factor_for_encoding("br"), 0.4);
    }

    #[test]
    fn test_preferred_encoding() {
        let accept = AcceptEncoding::new("deflate;q=0.5, gzip, br;q=0.9");
        assert_eq!(accept.preferred(&["br", "gzip", "deflate"]), Some("gzip"));
        assert_eq!(accept.preferred(&["zstd"]), None);
    }
}
