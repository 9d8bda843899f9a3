use std::fmt;
use std::io::{self, ErrorKind, Read};

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::body::PayloadDecoder;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};

/// Maximum number of bytes pulled from the connection per read.
const READ_SIZE: usize = 8 * 1024;

/// Lazy, finite, non-restartable request body.
///
/// The body pulls from its source only when asked for the next chunk, and
/// stops at the length announced by the request head.
pub struct ReqBody<'conn> {
    source: Option<&'conn mut dyn Read>,
    buffer: BytesMut,
    decoder: PayloadDecoder,
    pending: Bytes,
    finished: bool,
}

impl ReqBody<'static> {
    /// A body that yields nothing.
    pub fn empty() -> Self {
        Self {
            source: None,
            buffer: BytesMut::new(),
            decoder: PayloadDecoder::empty(),
            pending: Bytes::new(),
            finished: false,
        }
    }

    /// A body backed entirely by memory, mostly useful when driving a handler directly.
    pub fn from_bytes<B: Into<Bytes>>(bytes: B) -> Self {
        let bytes = bytes.into();
        Self {
            source: None,
            decoder: PayloadDecoder::fix_length(bytes.len() as u64),
            buffer: BytesMut::from(&bytes[..]),
            pending: Bytes::new(),
            finished: false,
        }
    }
}

impl<'conn> ReqBody<'conn> {
    /// Creates a body reading `size` bytes, starting with whatever the parser
    /// already buffered past the header terminator.
    pub(crate) fn new(source: &'conn mut dyn Read, buffer: BytesMut, size: PayloadSize) -> Self {
        Self { source: Some(source), buffer, decoder: size.into(), pending: Bytes::new(), finished: false }
    }

    /// Returns the next chunk of the body, or `None` once the declared length was read.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Incomplete`] when the connection closes before the
    /// declared length arrives, or [`ParseError::Io`] when reading fails.
    pub fn next_chunk(&mut self) -> Result<Option<Bytes>, ParseError> {
        if !self.pending.is_empty() {
            return Ok(Some(std::mem::take(&mut self.pending)));
        }

        if self.finished {
            return Ok(None);
        }

        loop {
            let item = match self.decoder.decode(&mut self.buffer)? {
                Some(item) => item,
                None if self.fill()? == 0 => match self.decoder.decode_eof(&mut self.buffer)? {
                    Some(item) => item,
                    None => return Err(ParseError::Incomplete),
                },
                None => continue,
            };

            return match item {
                PayloadItem::Chunk(bytes) => Ok(Some(bytes)),
                PayloadItem::Eof => {
                    self.finished = true;
                    Ok(None)
                }
            };
        }
    }

    /// Reads the rest of the body into a single buffer.
    pub fn read_all(&mut self) -> Result<Bytes, ParseError> {
        let mut collected = BytesMut::new();
        while let Some(chunk) = self.next_chunk()? {
            collected.extend_from_slice(&chunk);
        }
        Ok(collected.freeze())
    }

    /// Pulls at most one read worth of bytes from the source into the buffer.
    fn fill(&mut self) -> Result<usize, ParseError> {
        let Some(source) = self.source.as_mut() else {
            return Ok(0);
        };

        let want = self.decoder.remaining().min(READ_SIZE as u64) as usize;
        let start = self.buffer.len();
        self.buffer.resize(start + want, 0);

        let read = loop {
            match source.read(&mut self.buffer[start..]) {
                Ok(read) => break read,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buffer.truncate(start);
                    return Err(e.into());
                }
            }
        };

        self.buffer.truncate(start + read);
        trace!(read, "read request body bytes");
        Ok(read)
    }
}

impl Iterator for ReqBody<'_> {
    type Item = Result<Bytes, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

impl Read for ReqBody<'_> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.next_chunk() {
                Ok(Some(bytes)) => self.pending = bytes,
                Ok(None) => return Ok(0),
                Err(ParseError::Io { source }) => return Err(source),
                Err(e) => return Err(io::Error::new(ErrorKind::UnexpectedEof, e)),
            }
        }

        let len = out.len().min(self.pending.len());
        out[..len].copy_from_slice(&self.pending[..len]);
        self.pending.advance(len);
        Ok(len)
    }
}

impl fmt::Debug for ReqBody<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqBody")
            .field("buffered", &self.buffer.len())
            .field("remaining", &self.decoder.remaining())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn stops_at_content_length() {
        let mut source = Cursor::new(b"fgh".to_vec());
        let mut body = ReqBody::new(&mut source, BytesMut::from(&b"abcde"[..]), PayloadSize::Length(5));

        assert_eq!(&body.read_all().unwrap()[..], b"abcde");
        assert_eq!(body.next_chunk().unwrap(), None);
        assert_eq!(source.position(), 0);
    }

    #[test]
    fn pulls_rest_from_source() {
        let mut source = Cursor::new(b"cdefgh".to_vec());
        let mut body = ReqBody::new(&mut source, BytesMut::from(&b"ab"[..]), PayloadSize::Length(5));

        assert_eq!(&body.next_chunk().unwrap().unwrap()[..], b"ab");
        assert_eq!(&body.next_chunk().unwrap().unwrap()[..], b"cde");
        assert_eq!(body.next_chunk().unwrap(), None);
    }

    #[test]
    fn truncated_body_is_incomplete() {
        let mut source = Cursor::new(b"cd".to_vec());
        let mut body = ReqBody::new(&mut source, BytesMut::from(&b"ab"[..]), PayloadSize::Length(42));

        assert!(matches!(body.read_all(), Err(ParseError::Incomplete)));
    }

    #[test]
    fn empty_body_yields_nothing() {
        let mut body = ReqBody::empty();
        assert_eq!(body.next_chunk().unwrap(), None);
        assert!(body.next().is_none());
    }

    #[test]
    fn implements_read() {
        let mut body = ReqBody::from_bytes("hello world");
        let mut text = String::new();
        body.read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello world");
    }
}
