//! Canonical capitalization of header names.
//!
//! Header maps are case-insensitive; this is only used where names are rendered for humans
//! or for peers that care about case.

const IRREGULAR_NAMES: &[&str] = &[
    "Content-ID",
    "Content-MD5",
    "DNT",
    "ETag",
    "Last-Event-ID",
    "TCN",
    "TE",
    "WWW-Authenticate",
    "X-ATT-DeviceId",
    "X-DNSPrefetch-Control",
    "X-UA-Compatible",
    "X-UIDH",
    "X-WebKit-CSP",
    "X-XSS-Protection",
];

/// Maps any-case `name` to its conventional form: `content-type` becomes `Content-Type`,
/// `etag` becomes `ETag`.
pub fn canonical_name(name: &str) -> String {
    if let Some(irregular) = IRREGULAR_NAMES.iter().find(|irregular| irregular.eq_ignore_ascii_case(name)) {
        return (*irregular).to_owned();
    }

    let mut out = String::with_capacity(name.len());
    for (index, segment) in name.split('-').enumerate() {
        if index > 0 {
            out.push('-');
        }
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.extend(chars.map(|c| c.to_ascii_lowercase()));
        }
    }
    out
}
