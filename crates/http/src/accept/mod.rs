//! Content negotiation over the `Accept` family of headers (RFC 2616 section 14).
//!
//! Each negotiator wraps the raw header value and parses it into [`MediaValue`]s the first
//! time it is queried. An absent or empty header accepts everything with quality `1`.

mod charset;
mod encoding;
mod language;
mod media;

pub use charset::AcceptCharset;
pub use encoding::AcceptEncoding;
pub use language::AcceptLanguage;
pub use media::Accept;

use crate::MediaValue;
use once_cell::sync::OnceCell;

/// Common surface of the four negotiators.
pub trait Negotiator {
    /// The quality factor the client assigned to `candidate`, `0` when it is not acceptable.
    fn quality_factor(&self, candidate: &str) -> f32;

    fn accepts(&self, candidate: &str) -> bool {
        self.quality_factor(candidate) != 0.0
    }

    /// Picks the acceptable candidate with the highest quality, the first listed wins ties.
    fn preferred<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        let mut best: Option<(&'a str, f32)> = None;
        for &candidate in candidates {
            let quality = self.quality_factor(candidate);
            if quality > 0.0 && best.is_none_or(|(_, q)| quality > q) {
                best = Some((candidate, quality));
            }
        }
        best.map(|(candidate, _)| candidate)
    }
}

/// A raw header value with its lazily parsed media values.
#[derive(Debug)]
struct HeaderValues {
    raw: String,
    type_separator: char,
    parsed: OnceCell<Vec<MediaValue>>,
}

impl HeaderValues {
    fn new(raw: String, type_separator: char) -> Self {
        Self { raw, type_separator, parsed: OnceCell::new() }
    }

    fn raw(&self) -> &str {
        &self.raw
    }

    fn get(&self) -> &[MediaValue] {
        self.parsed.get_or_init(|| MediaValue::parse_list(&self.raw, self.type_separator))
    }
}

impl Clone for HeaderValues {
    fn clone(&self) -> Self {
        Self::new(self.raw.clone(), self.type_separator)
    }
}

fn eq_token(left: &str, right: &str) -> bool {
    left.eq_ignore_ascii_case(right)
}

/// Shared by the charset and encoding negotiators: concrete entries take precedence over
/// `*`, concrete entries are otherwise kept in header order.
fn matching_token<'v>(values: &'v [MediaValue], candidate: &str) -> Vec<&'v MediaValue> {
    let mut matches: Vec<&MediaValue> =
        values.iter().filter(|value| value.is_wildcard() || eq_token(value.media_type(), candidate)).collect();
    matches.sort_by_key(|value| value.is_wildcard());
    matches
}
