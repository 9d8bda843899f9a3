//! HTTP request body handling implementation.
//!
//! A worker serves exactly one request per connection and reads it on the
//! handler's own thread, so the body is a plain pull-based stream over the
//! connection rather than a channel fed by a concurrent task:
//!
//! - [`ReqBody`] yields the bytes that were already buffered past the header
//!   terminator first, then reads the remainder straight from the connection.
//! - The stream never yields more than the declared `Content-Length`, whatever
//!   else the client sent.
//! - A connection closed before the declared length arrives surfaces as
//!   [`ParseError::Incomplete`](crate::protocol::ParseError::Incomplete).

mod req_body;

pub use req_body::ReqBody;
