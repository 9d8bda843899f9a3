//! HTTP request decoder module
//!
//! This module frames a request head out of a byte stream. Bytes are pushed
//! into a [`BytesMut`] as they arrive from the socket; the decoder keeps track of
//! how far it already searched for the `\r\n\r\n` terminator, so a head split
//! across many reads is scanned only once.
//!
//! Whatever follows the terminator stays in the buffer and becomes the start of
//! the request body.
//!
//! # Example
//!
//! ```
//! use prefork_http::codec::RequestDecoder;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n"[..]);
//! let (head, _payload_size) = decoder.decode(&mut buffer).unwrap().unwrap();
//! assert_eq!(head.path(), "/");
//! ```

use crate::codec::header::HeaderDecoder;
use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, RequestHead};
use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

/// Maximum size in bytes allowed for the request head, terminator included
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

const TERMINATOR: &[u8] = b"\r\n\r\n";

/// A decoder producing the head of a request along with its body size.
#[derive(Debug)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    /// Number of leading bytes known not to contain the terminator
    scanned: usize,
}

impl RequestDecoder {
    /// Creates a new `RequestDecoder` instance
    pub fn new() -> Self {
        Default::default()
    }

    fn find_terminator(&mut self, src: &[u8]) -> Option<usize> {
        let start = self.scanned.saturating_sub(TERMINATOR.len() - 1);
        match src[start..].windows(TERMINATOR.len()).position(|window| window == TERMINATOR) {
            Some(position) => Some(start + position),
            None => {
                self.scanned = src.len();
                None
            }
        }
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { header_decoder: HeaderDecoder, scanned: 0 }
    }
}

impl Decoder for RequestDecoder {
    type Item = (RequestHead, PayloadSize);
    type Error = ParseError;

    /// Attempts to decode a request head from the provided buffer
    ///
    /// # Returns
    ///
    /// - `Ok(Some((head, payload_size)))`: the head was found and parsed; it was
    ///   removed from `src` together with its terminator
    /// - `Ok(None)`: the terminator has not arrived yet
    /// - `Err(_)`: the head is malformed or grew past [`MAX_HEADER_BYTES`]
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(end) = self.find_terminator(src) else {
            ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
            return Ok(None);
        };

        let head_size = end + TERMINATOR.len();
        ensure!(head_size <= MAX_HEADER_BYTES, ParseError::too_large_header(head_size, MAX_HEADER_BYTES));

        let block = src.split_to(head_size);
        self.scanned = 0;
        trace!(head_size, "found request head terminator");

        let head = self.header_decoder.parse(&block[..end])?;
        let payload_size = head.payload_size();
        Ok(Some((head, payload_size)))
    }

    /// The peer closed the connection: a head still missing its terminator is incomplete.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Err(ParseError::Incomplete),
        }
    }
}
