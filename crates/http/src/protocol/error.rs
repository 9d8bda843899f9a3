use std::io;

use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use thiserror::Error;

use crate::protocol::Response;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

/// Failures while reading a request off the wire.
///
/// Every variant maps to a response the worker can still send back to the client, see
/// [`ParseError::to_response`]. None of them is fatal to the worker.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("bad syntax: {line}")]
    BadSyntax { line: String },

    #[error("bad http version: {version}")]
    BadVersion { version: String },

    #[error("incomplete http request")]
    Incomplete,

    #[error("request head is not valid utf-8")]
    Undecodable,

    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn bad_syntax<S: ToString>(line: S) -> Self {
        Self::BadSyntax { line: line.to_string() }
    }

    pub fn bad_version<S: ToString>(version: S) -> Self {
        Self::BadVersion { version: version.to_string() }
    }

    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// The status code sent back to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ParseError::BadSyntax { .. }
            | ParseError::BadVersion { .. }
            | ParseError::Incomplete
            | ParseError::TooLargeHeader { .. } => StatusCode::BAD_REQUEST,
            ParseError::Undecodable | ParseError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Renders the plain text error response for this failure.
    pub fn to_response(&self) -> Response {
        let message = match self {
            ParseError::BadSyntax { line } => format!("Bad Syntax ({line})"),
            ParseError::BadVersion { version } => format!("Bad Version ({version})"),
            ParseError::Incomplete => "Incomplete HTTP Request".to_string(),
            ParseError::TooLargeHeader { .. } => "Request Header Too Large".to_string(),
            ParseError::Undecodable | ParseError::Io { .. } => "Internal Server Error".to_string(),
        };

        plain_text(self.status(), message)
    }
}

/// Builds a `text/plain` response with the given status and body.
pub fn plain_text<B: Into<Bytes>>(status: StatusCode, body: B) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
