//! The HTTP/1.x wire layer of a preforking server
//!
//! This crate reads a single request from a blocking stream, hands it to a
//! [`handler::Handler`] and writes the response back with `Connection: close`.
//! It knows nothing about processes or sockets; the `prefork` crate feeds it
//! accepted connections from inside its worker processes.
//!
//! # Example
//!
//! ```
//! use std::io;
//! use bytes::Bytes;
//! use http::StatusCode;
//! use prefork_http::connection::HttpConnection;
//! use prefork_http::handler::make_handler;
//! use prefork_http::protocol::{Request, Response};
//!
//! let handler = make_handler(|request: Request<'_>| -> Result<Response, io::Error> {
//!     let body = format!("Hello {}!", request.path());
//!     let mut response = Response::new(Bytes::from(body));
//!     *response.status_mut() = StatusCode::OK;
//!     Ok(response)
//! });
//!
//! // any `Read + Write` works, an accepted socket in practice
//! let mut stream = io::Cursor::new(b"GET /world HTTP/1.1\r\nHost: localhost\r\n\r\n".to_vec());
//! HttpConnection::new(&mut stream).process(&handler).unwrap();
//! ```
//!
//! The cursor above serves as both ends; the response lands after the request bytes.
//!
//! # Architecture
//!
//! - [`connection`]: the parser over a push-back buffer and the per-connection driver
//! - [`protocol`]: request, response, body and error types
//! - [`codec`]: the request head decoder, body decoder and response encoder
//! - [`handler`]: the handler trait and closure adapter
//!
//! # Wire format
//!
//! - The request line holds exactly three space separated tokens, the version starts with `HTTP/1`
//! - Headers are split on the first colon, at most one leading space is removed from the value
//! - The body is as long as the first valid `Content-Length`, or empty without one
//! - The request head may not exceed 64 KiB
//!
//! # Limitations
//!
//! - No keep-alive and no pipelining: one request per connection
//! - No chunked request bodies
//! - No TLS and no HTTP/2

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
