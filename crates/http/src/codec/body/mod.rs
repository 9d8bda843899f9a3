//! HTTP body decoding for request payloads
//!
//! - [`LengthDecoder`](length_decoder::LengthDecoder): Processes fixed-length payloads
//! - [`PayloadDecoder`]: Picks the strategy for a request, no body or a fixed length
//!
//! Workers close every connection after one response and never accept
//! chunked request bodies, so only `Content-Length` framing exists here.

mod length_decoder;
mod payload_decoder;

pub use payload_decoder::PayloadDecoder;
