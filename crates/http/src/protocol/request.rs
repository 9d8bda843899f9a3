//! HTTP request handling implementation.
//!
//! Request heads keep the raw text the client sent: the method, path and
//! version tokens are not validated beyond what the parser checks, and
//! headers stay in source order with duplicates preserved.

use crate::protocol::PayloadSize;
use crate::protocol::body::ReqBody;

/// The parsed request line and header block of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    method: String,
    path: String,
    version: String,
    headers: Vec<(String, String)>,
}

impl RequestHead {
    pub fn new<M, P, V>(method: M, path: P, version: V, headers: Vec<(String, String)>) -> Self
    where
        M: Into<String>,
        P: Into<String>,
        V: Into<String>,
    {
        Self { method: method.into(), path: path.into(), version: version.into(), headers }
    }

    /// Returns the request method token, e.g. `GET`.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the request target as sent, query string included.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the version token, always starting with `HTTP/1`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns all headers in the order the client sent them.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the value of the first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
    }

    /// Returns the first `Content-Length` value that parses as a length.
    ///
    /// Values that are not a number are skipped rather than rejected.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case("content-length"))
            .find_map(|(_, value)| value.trim().parse::<u64>().ok())
    }

    /// Determines how much body follows this head.
    pub fn payload_size(&self) -> PayloadSize {
        match self.content_length() {
            Some(length) => PayloadSize::Length(length),
            None => PayloadSize::Empty,
        }
    }

    /// Attaches a body to this head, converting it into a full [`Request`].
    pub fn body<'conn>(self, body: ReqBody<'conn>) -> Request<'conn> {
        Request { head: self, body }
    }
}

/// A parsed request handed to the handler.
///
/// The body borrows the connection it is read from, so a request never
/// outlives the connection it came in on.
#[derive(Debug)]
pub struct Request<'conn> {
    head: RequestHead,
    body: ReqBody<'conn>,
}

impl<'conn> Request<'conn> {
    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn method(&self) -> &str {
        self.head.method()
    }

    pub fn path(&self) -> &str {
        self.head.path()
    }

    pub fn version(&self) -> &str {
        self.head.version()
    }

    pub fn headers(&self) -> &[(String, String)] {
        self.head.headers()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.header(name)
    }

    pub fn body_mut(&mut self) -> &mut ReqBody<'conn> {
        &mut self.body
    }

    pub fn into_body(self) -> ReqBody<'conn> {
        self.body
    }
}
