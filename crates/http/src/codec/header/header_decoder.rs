//! HTTP request head parsing
//!
//! Turns a complete header block, already cut at the `\r\n\r\n` terminator by
//! [`RequestDecoder`](crate::codec::RequestDecoder), into a [`RequestHead`].
//!
//! # Rules
//!
//! - The block must be valid UTF-8, otherwise the request is undecodable
//! - The request line must hold exactly three tokens separated by single spaces
//! - The version token must start with `HTTP/1`
//! - Header lines are split on the first `:`; at most one leading space is
//!   removed from the value. Lines without a colon are dropped
//! - Header order and duplicate names are kept as sent

use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, RequestHead};

/// Parser for a framed request head implementing the request line and header rules above.
#[derive(Debug)]
pub struct HeaderDecoder;

impl HeaderDecoder {
    /// Parses `block`, the header block without its terminating blank line.
    ///
    /// # Errors
    ///
    /// - [`ParseError::Undecodable`] if the block is not valid UTF-8
    /// - [`ParseError::BadSyntax`] if the request line does not have three tokens
    /// - [`ParseError::BadVersion`] if the version does not start with `HTTP/1`
    pub fn parse(&self, block: &[u8]) -> Result<RequestHead, ParseError> {
        let text = std::str::from_utf8(block).map_err(|_| ParseError::Undecodable)?;

        let mut lines = text.split("\r\n");
        let request_line = lines.next().unwrap_or_default();

        let tokens: Vec<&str> = request_line.split(' ').collect();
        let [method, path, version] = tokens[..] else {
            return Err(ParseError::bad_syntax(request_line));
        };

        ensure!(version.starts_with("HTTP/1"), ParseError::bad_version(version));

        let headers: Vec<(String, String)> = lines.filter_map(parse_header_line).collect();
        trace!(method, path, header_count = headers.len(), "parsed request head");

        Ok(RequestHead::new(method, path, version, headers))
    }
}

/// Splits one `Name: value` line; returns `None` for lines without a colon.
fn parse_header_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let value = value.strip_prefix(' ').unwrap_or(value);
    Some((name.to_string(), value.to_string()))
}
