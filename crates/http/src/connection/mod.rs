//! HTTP connection handling module
//!
//! This module reads requests from and writes responses to blocking streams.
//!
//! # Components
//!
//! - [`HttpParser`]: reads one request from a stream, pushing bytes read past
//!   the head back in front of the body
//! - [`HttpConnection`]: serves exactly one request per connection:
//!   - parses the request, answering parse failures with their error response
//!   - calls the handler, turning errors and panics into error responses
//!   - writes the response with `Connection: close`

mod http_connection;
mod http_parser;

pub use http_connection::HttpConnection;
pub use http_parser::HttpParser;
