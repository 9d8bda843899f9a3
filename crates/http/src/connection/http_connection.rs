use std::error::Error;
use std::io::{self, Read, Write};
use std::panic::{self, AssertUnwindSafe};

use bytes::BytesMut;
use http::StatusCode;
use tokio_util::codec::Encoder;
use tracing::{error, info, warn};

use crate::codec::ResponseEncoder;
use crate::connection::HttpParser;
use crate::handler::Handler;
use crate::protocol::{HttpError, ParseError, Request, Response, SendError, plain_text};

/// A single HTTP exchange over a blocking stream
///
/// `HttpConnection` reads one request, runs the handler on it and writes the
/// response back. Connections are never kept alive: after [`process`](Self::process)
/// returns the caller shuts the stream down.
///
/// # Type Parameters
///
/// * `S`: The blocking stream type, usually an accepted socket or `&mut` to one
#[derive(Debug)]
pub struct HttpConnection<S> {
    parser: HttpParser<S>,
    encoder: ResponseEncoder,
}

impl<S> HttpConnection<S>
where
    S: Read + Write,
{
    pub fn new(stream: S) -> Self {
        Self { parser: HttpParser::new(stream), encoder: ResponseEncoder::new() }
    }

    /// Serves exactly one request.
    ///
    /// Handler failures and panics are answered with an error response and do not
    /// show up in the result; the result only reports whether the request could
    /// be parsed and whether the response could be written.
    pub fn process<H: Handler>(mut self, handler: &H) -> Result<(), HttpError> {
        let (response, parse_error) = match self.parser.parse() {
            Ok(request) => (call_handler(handler, request), None),
            Err(e) => {
                warn!(cause = %e, "can't parse request");
                (e.to_response(), Some(e))
            }
        };

        self.send_response(response)?;
        match parse_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn send_response(&mut self, response: Response) -> Result<(), SendError> {
        let mut buffer = BytesMut::new();
        self.encoder.encode(response, &mut buffer)?;

        let stream = self.parser.get_mut();
        stream.write_all(&buffer).map_err(SendError::io)?;
        stream.flush().map_err(SendError::io)
    }
}

/// Runs the handler, logging the exchange and containing any failure.
fn call_handler<H: Handler>(handler: &H, request: Request<'_>) -> Response {
    let method = request.method().to_string();
    let path = request.path().to_string();

    let response = match panic::catch_unwind(AssertUnwindSafe(|| handler.call(request))) {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => error_response(e.into()),
        Err(_) => {
            error!(method = %method, path = %path, "handler panicked");
            plain_text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    };

    info!("{method} {path} - {}", response.status());
    response
}

/// Turns a handler error into the response sent to the client.
///
/// A [`ParseError`] surfacing from the handler, typically a truncated body it tried
/// to read, is answered the same way as if the parser had hit it.
fn error_response(e: Box<dyn Error + Send + Sync>) -> Response {
    match into_parse_error(e) {
        Ok(parse_error) => {
            warn!(cause = %parse_error, "handler hit a malformed request");
            parse_error.to_response()
        }
        Err(e) => {
            error!(cause = %e, "handle response error");
            plain_text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

/// Extracts a [`ParseError`] returned as is, or wrapped in the `io::Error` the
/// body's `Read` impl produces.
fn into_parse_error(e: Box<dyn Error + Send + Sync>) -> Result<ParseError, Box<dyn Error + Send + Sync>> {
    let e = match e.downcast::<ParseError>() {
        Ok(parse_error) => return Ok(*parse_error),
        Err(e) => e,
    };

    let io_error = match e.downcast::<io::Error>() {
        Ok(io_error) => io_error,
        Err(e) => return Err(e),
    };
    if !io_error.get_ref().is_some_and(|inner| inner.is::<ParseError>()) {
        return Err(io_error as Box<dyn Error + Send + Sync>);
    }

    let kind = io_error.kind();
    match (*io_error).into_inner().map(|inner| inner.downcast::<ParseError>()) {
        Some(Ok(parse_error)) => Ok(*parse_error),
        Some(Err(inner)) => Err(inner),
        None => Err(Box::new(io::Error::from(kind))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::MockIO;
    use crate::handler::make_handler;
    use bytes::Bytes;

    fn ok(body: &'static str) -> Response {
        Response::new(Bytes::from_static(body.as_bytes()))
    }

    fn written(io: &MockIO) -> String {
        String::from_utf8(io.written().to_vec()).unwrap()
    }

    #[test]
    fn serves_one_request() {
        let mut io = MockIO::new(b"GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let handler = make_handler(|request: Request<'_>| -> Result<Response, io::Error> {
            assert_eq!(request.path(), "/hello");
            Ok(ok("Hello World!"))
        });

        HttpConnection::new(&mut io).process(&handler).unwrap();

        assert_eq!(written(&io), "HTTP/1.1 200 OK\r\nconnection: close\r\ncontent-length: 12\r\n\r\nHello World!");
    }

    #[test]
    fn handler_reads_body() {
        let mut io = MockIO::new(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nabcdefgh").with_chunk_size(4);
        let handler = make_handler(|mut request: Request<'_>| -> Result<Response, ParseError> {
            let body = request.body_mut().read_all()?;
            Ok(Response::new(body))
        });

        HttpConnection::new(&mut io).process(&handler).unwrap();

        assert!(written(&io).ends_with("\r\n\r\nabcde"));
    }

    #[test]
    fn parse_error_is_answered() {
        let mut io = MockIO::new(b"GET /\r\n\r\n");
        let handler = make_handler(|_: Request<'_>| -> Result<Response, io::Error> { Ok(ok("unreachable")) });

        let result = HttpConnection::new(&mut io).process(&handler);

        assert!(matches!(result, Err(HttpError::RequestError { source: ParseError::BadSyntax { .. } })));
        let written = written(&io);
        assert!(written.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(written.ends_with("Bad Syntax (GET /)"));
    }

    #[test]
    fn truncated_body_read_by_handler_is_400() {
        let mut io = MockIO::new(b"POST / HTTP/1.1\r\nContent-Length: 42\r\n\r\nabc");
        let handler = make_handler(|mut request: Request<'_>| -> Result<Response, ParseError> {
            request.body_mut().read_all()?;
            Ok(ok("unreachable"))
        });

        HttpConnection::new(&mut io).process(&handler).unwrap();

        let written = written(&io);
        assert!(written.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(written.ends_with("Incomplete HTTP Request"));
    }

    #[test]
    fn truncated_body_read_through_io_is_400() {
        let mut io = MockIO::new(b"POST / HTTP/1.1\r\nContent-Length: 42\r\n\r\nabc");
        let handler = make_handler(|mut request: Request<'_>| -> Result<Response, io::Error> {
            let mut body = Vec::new();
            request.body_mut().read_to_end(&mut body)?;
            Ok(ok("unreachable"))
        });

        HttpConnection::new(&mut io).process(&handler).unwrap();

        let written = written(&io);
        assert!(written.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(written.ends_with("Incomplete HTTP Request"));
    }

    #[test]
    fn plain_io_error_from_handler_is_500() {
        let mut io = MockIO::new(b"GET / HTTP/1.1\r\n\r\n");
        let handler = make_handler(|_: Request<'_>| -> Result<Response, io::Error> {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "upstream went away"))
        });

        HttpConnection::new(&mut io).process(&handler).unwrap();

        assert!(written(&io).starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    }

    #[test]
    fn handler_error_is_500() {
        let mut io = MockIO::new(b"GET / HTTP/1.1\r\n\r\n");
        let handler = make_handler(|_: Request<'_>| -> Result<Response, io::Error> { Err(io::Error::other("boom")) });

        HttpConnection::new(&mut io).process(&handler).unwrap();

        let written = written(&io);
        assert!(written.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(written.ends_with("Internal Server Error"));
    }

    #[test]
    fn handler_panic_is_500() {
        let mut io = MockIO::new(b"GET / HTTP/1.1\r\n\r\n");
        let handler = make_handler(|_: Request<'_>| -> Result<Response, io::Error> { panic!("handler bug") });

        HttpConnection::new(&mut io).process(&handler).unwrap();

        assert!(written(&io).starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    }
}
