//! Core HTTP protocol abstractions.
//!
//! This module provides the types that flow between the parser, the handler
//! and the response encoder.
//!
//! # Architecture
//!
//! - **Message Handling** ([`message`]): payload chunks and sizes
//!   - [`PayloadItem`]: a body chunk or the end of the body
//!   - [`PayloadSize`]: how much body follows a request head
//!
//! - **Request Processing** ([`request`]): request heads and requests
//!   - [`RequestHead`]: method, path, version and ordered headers
//!   - [`Request`]: a head plus its lazily read body
//!
//! - **Response Processing** ([`response`]): the [`Response`] type handlers return
//!
//! - **Body Streaming** ([`body`]): [`ReqBody`](body::ReqBody), the pull based request body
//!
//! - **Error Handling** ([`error`]):
//!   - [`HttpError`]: Top-level error type
//!   - [`ParseError`]: Request parsing errors, each with its own error response
//!   - [`SendError`]: Response sending errors

mod message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::Request;
pub use request::RequestHead;

mod response;
pub use response::Response;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
pub use error::plain_text;

pub mod body;
