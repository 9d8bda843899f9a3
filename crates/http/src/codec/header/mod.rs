//! HTTP header processing for request heads and response heads
//!
//! - [`HeaderDecoder`]: parses a framed request head into a
//!   [`RequestHead`](crate::protocol::RequestHead)
//! - [`HeaderEncoder`]: writes a response status line and header block,
//!   forcing `Connection: close`

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
