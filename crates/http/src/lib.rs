//! HTTP message primitives for the mach middleware stack
//!
//! This crate holds the building blocks that know nothing about an app chain: the content
//! negotiation engine for the `Accept` family of headers, a structured URL model, and the
//! [`Message`] type that couples headers with a streaming [`Content`] body.
//!
//! # Example
//!
//! ```
//! use mach_http::accept::{Accept, Negotiator};
//! use mach_http::Location;
//!
//! let accept = Accept::new("text/*;q=0.3, text/html;q=0.7, */*;q=0.5");
//! assert_eq!(accept.quality_factor_for_media_type("text/plain"), 0.3);
//! assert_eq!(accept.preferred(&["image/png", "text/html"]), Some("text/html"));
//!
//! let mut location: Location = "http://example.com/a/b?x=1".parse().unwrap();
//! location.set_host("example.com:9000");
//! assert_eq!(location.href(), "http://example.com:9000/a/b?x=1");
//! ```
//!
//! # Modules
//!
//! - [`accept`]: the four negotiators and the shared [`accept::Negotiator`] trait
//! - [`parser`]: content parsers keyed by media type, including multipart uploads
//!
//! # Content
//!
//! [`Content`] is either an in-memory buffer or a single-pass stream implementing
//! `http_body::Body`. Buffering a [`Message`] turns its content into the in-memory form, so
//! later reads replay the same bytes without touching the original stream.
//!
//! # Error Handling
//!
//! - [`ContentError`]: buffering, decoding and parsing failures, including the
//!   [`ContentError::MaxLengthExceeded`] condition callers usually map to `413`
//! - [`LocationError`]: malformed URLs and ports

pub mod accept;
mod content;
mod error;
mod headers;
mod location;
mod media_value;
mod message;
mod params;
pub mod parser;
mod query;
mod utils;

pub use content::Content;
pub use error::{ContentError, LocationError};
pub use headers::canonical_name;
pub use location::{Location, LocationOptions, standard_port};
pub use media_value::{MediaValue, QUALITY_PARAM};
pub use message::Message;
pub use params::{Param, Params, UploadedFile};
pub use query::{Query, QueryValue};
