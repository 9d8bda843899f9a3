//! HTTP header encoder implementation for serializing HTTP response heads
//!
//! Every response leaves with `Connection: close`: workers serve exactly one
//! request per connection, so any `Connection` header set by a handler is
//! dropped. A `Content-Length` matching the body is added unless the handler
//! already set one.

use bytes::{BufMut, BytesMut};
use http::header;
use http::response::Parts;
use std::io;
use std::io::Write;
use tokio_util::codec::Encoder;

use crate::protocol::SendError;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Encoder for HTTP response heads implementing the [`Encoder`] trait.
///
/// The item is the response [`Parts`] along with the length of the body that
/// will follow.
#[derive(Debug)]
pub struct HeaderEncoder;

impl Encoder<(Parts, u64)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (Parts, u64), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (parts, body_length) = item;

        dst.reserve(INIT_HEADER_SIZE);
        match parts.status.canonical_reason() {
            Some(reason) => write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", parts.status.as_str(), reason)?,
            None => write!(FastWrite(dst), "HTTP/1.1 {}\r\n", parts.status.as_str())?,
        }
        dst.put_slice(b"connection: close\r\n");

        for (header_name, header_value) in parts.headers.iter() {
            if header_name == header::CONNECTION {
                continue;
            }
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }

        if !parts.headers.contains_key(header::CONTENT_LENGTH) {
            write!(FastWrite(dst), "content-length: {body_length}\r\n")?;
        }

        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Writer over a [`BytesMut`] that never fails, used for `write!` formatting.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
