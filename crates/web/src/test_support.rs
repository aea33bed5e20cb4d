use crate::connection::{Connection, Environment};
use http::Method;
use mach_http::Content;

pub(crate) fn request(method: Method, uri: &str) -> http::Request<Content> {
    http::Request::builder().method(method).uri(uri).header("host", "example.com").body(Content::empty()).unwrap()
}

pub(crate) fn conn(method: Method, uri: &str) -> Connection {
    Connection::from_request(request(method, uri), None, &Environment::default())
}

pub(crate) fn conn_with(request: http::Request<Content>) -> Connection {
    Connection::from_request(request, None, &Environment::default())
}
