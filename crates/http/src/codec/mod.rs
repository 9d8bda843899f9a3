//! HTTP codec module for decoding requests and encoding responses
//!
//! The codecs implement the [`tokio_util::codec`] traits over [`bytes::BytesMut`]
//! but never touch a socket themselves: the connection reads bytes into a
//! buffer, lets the decoder look at them, and writes whatever the encoder
//! produced. That keeps them usable from the blocking worker loop.
//!
//! # Architecture
//!
//! - Request handling:
//!   - [`RequestDecoder`]: frames and parses the request head
//!   - Head parsing via the [`header`] module
//!   - Body decoding via the [`body`] module, driven lazily by
//!     [`ReqBody`](crate::protocol::body::ReqBody)
//!
//! - Response handling:
//!   - [`ResponseEncoder`]: encodes a complete response
//!   - Head encoding via the [`header`] module
//!
//! # Example
//!
//! ```
//! use prefork_http::codec::{RequestDecoder, ResponseEncoder};
//! use prefork_http::protocol::Response;
//! use tokio_util::codec::{Decoder, Encoder};
//! use bytes::{Bytes, BytesMut};
//!
//! let mut request_buffer = BytesMut::from(&b"GET / HTTP/1.1\r\n\r\n"[..]);
//! let (head, _) = RequestDecoder::new().decode(&mut request_buffer).unwrap().unwrap();
//! assert_eq!(head.method(), "GET");
//!
//! let mut response_buffer = BytesMut::new();
//! ResponseEncoder::new().encode(Response::new(Bytes::from_static(b"ok")), &mut response_buffer).unwrap();
//! assert!(response_buffer.starts_with(b"HTTP/1.1 200 OK\r\n"));
//! ```

pub(crate) mod body;
mod header;
mod request_decoder;
mod response_encoder;

pub use request_decoder::MAX_HEADER_BYTES;
pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
