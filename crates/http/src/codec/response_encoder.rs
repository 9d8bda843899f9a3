use crate::codec::header::HeaderEncoder;
use crate::protocol::{Response, SendError};
use bytes::BytesMut;
use tokio_util::codec::Encoder;

/// Serializes a complete [`Response`]: status line, headers, blank line, body.
#[derive(Debug)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { header_encoder: HeaderEncoder }
    }
}

impl Encoder<Response> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (parts, body) = item.into_parts();
        self.header_encoder.encode((parts, body.len() as u64), dst)?;
        dst.extend_from_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{StatusCode, header};

    fn encode(response: Response) -> String {
        let mut dst = BytesMut::new();
        ResponseEncoder::new().encode(response, &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn forces_connection_close() {
        let response = http::Response::builder()
            .status(StatusCode::OK)
            .header(header::CONNECTION, "keep-alive")
            .header("X-Request", "1")
            .body(bytes::Bytes::from_static(b"hello"))
            .unwrap();

        assert_eq!(
            encode(response),
            "HTTP/1.1 200 OK\r\nconnection: close\r\nx-request: 1\r\ncontent-length: 5\r\n\r\nhello"
        );
    }

    #[test]
    fn keeps_handler_content_length() {
        let response = http::Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header(header::CONTENT_LENGTH, "0")
            .body(bytes::Bytes::new())
            .unwrap();

        assert_eq!(encode(response), "HTTP/1.1 404 Not Found\r\nconnection: close\r\ncontent-length: 0\r\n\r\n");
    }

    #[test]
    fn unknown_status_has_no_reason() {
        let response = http::Response::builder().status(599).body(bytes::Bytes::new()).unwrap();

        assert!(encode(response).starts_with("HTTP/1.1 599\r\n"));
    }
}
