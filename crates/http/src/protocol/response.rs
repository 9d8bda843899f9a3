//! HTTP response type.
//!
//! Handlers build responses with the `http` crate and hand the whole body
//! over at once; the worker writes it out in full before closing the
//! connection.

use bytes::Bytes;

/// A complete response produced by a handler.
pub type Response = http::Response<Bytes>;
