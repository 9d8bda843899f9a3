//! Request handlers
//!
//! A [`Handler`] turns one [`Request`] into one [`Response`]. It runs inside a
//! worker process, synchronously, one request at a time.

use std::error::Error;

use crate::protocol::{Request, Response};

pub trait Handler {
    type Error: Into<Box<dyn Error + Send + Sync>>;

    fn call(&self, request: Request<'_>) -> Result<Response, Self::Error>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<Err, F> Handler for HandlerFn<F>
where
    F: Fn(Request<'_>) -> Result<Response, Err>,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    type Error = Err;

    fn call(&self, request: Request<'_>) -> Result<Response, Self::Error> {
        (self.f)(request)
    }
}

pub fn make_handler<F, Err>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<'_>) -> Result<Response, Err>,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    HandlerFn { f }
}

impl<H: Handler + ?Sized> Handler for &H {
    type Error = H::Error;

    fn call(&self, request: Request<'_>) -> Result<Response, Self::Error> {
        (**self).call(request)
    }
}
