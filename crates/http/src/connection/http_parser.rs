use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::RequestDecoder;
use crate::protocol::body::ReqBody;
use crate::protocol::{ParseError, Request};

/// Number of bytes requested from the reader per read call.
const READ_SIZE: usize = 8 * 1024;

/// Reads one request off a blocking byte stream.
///
/// Bytes are read in blocks into a buffer until the head terminator shows up.
/// Whatever was read past the terminator is pushed back in front of the
/// reader and handed to the request body, so nothing is lost when a single
/// read returns both the head and the start of the body.
#[derive(Debug)]
pub struct HttpParser<R> {
    reader: R,
    buffer: BytesMut,
    decoder: RequestDecoder,
}

impl<R: Read> HttpParser<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buffer: BytesMut::with_capacity(READ_SIZE), decoder: RequestDecoder::new() }
    }

    /// Parses the next request.
    ///
    /// The returned request borrows the reader for its body, which is read lazily
    /// and stops at the declared `Content-Length`.
    ///
    /// # Errors
    ///
    /// Any [`ParseError`]; [`ParseError::Incomplete`] when the reader reaches EOF
    /// before the head terminator.
    pub fn parse(&mut self) -> Result<Request<'_>, ParseError> {
        let (head, payload_size) = loop {
            if let Some(item) = self.decoder.decode(&mut self.buffer)? {
                break item;
            }

            if self.fill()? == 0 {
                match self.decoder.decode_eof(&mut self.buffer)? {
                    Some(item) => break item,
                    None => return Err(ParseError::Incomplete),
                }
            }
        };

        trace!(buffered = self.buffer.len(), ?payload_size, "request head parsed");
        let pushed_back = self.buffer.split();
        Ok(head.body(ReqBody::new(&mut self.reader, pushed_back, payload_size)))
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    fn fill(&mut self) -> Result<usize, ParseError> {
        let start = self.buffer.len();
        self.buffer.resize(start + READ_SIZE, 0);

        loop {
            match self.reader.read(&mut self.buffer[start..]) {
                Ok(read) => {
                    self.buffer.truncate(start + read);
                    return Ok(read);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buffer.truncate(start);
                    return Err(e.into());
                }
            }
        }
    }
}
