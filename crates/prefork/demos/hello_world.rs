//! Greets on `GET`, echoes the body back on `POST`.
//!
//! ```sh
//! cargo run --example hello_world -- --workers 4 --bind 127.0.0.1:8000
//! kill -TTIN <arbiter pid>   # one more worker
//! ```

use std::error::Error;

use bytes::Bytes;
use http::{StatusCode, header};
use prefork_http::handler::make_handler;
use prefork_http::protocol::{Request, Response};

fn hello(mut request: Request<'_>) -> Result<Response, Box<dyn Error + Send + Sync>> {
    let body = match request.method() {
        "GET" => Bytes::from(format!("Hello {}!\n", request.path())),
        "POST" => request.body_mut().read_all()?,
        _ => {
            let mut response = Response::new(Bytes::from_static(b"Method Not Allowed\n"));
            *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
            return Ok(response);
        }
    };

    let mut response = Response::new(body);
    response.headers_mut().insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/plain"));
    Ok(response)
}

fn main() {
    prefork::serve(make_handler(hello));
}
