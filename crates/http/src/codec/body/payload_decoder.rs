use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::length_decoder::LengthDecoder;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};

/// Body decoder chosen from the request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadDecoder {
    Length(LengthDecoder),
    /// No `Content-Length`: the body ends before it starts
    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        PayloadDecoder::NoBody
    }

    pub fn fix_length(length: u64) -> Self {
        PayloadDecoder::Length(LengthDecoder::new(length))
    }

    pub fn remaining(&self) -> u64 {
        match self {
            PayloadDecoder::Length(decoder) => decoder.remaining(),
            PayloadDecoder::NoBody => 0,
        }
    }
}

impl From<PayloadSize> for PayloadDecoder {
    fn from(size: PayloadSize) -> Self {
        match size {
            PayloadSize::Length(length) => PayloadDecoder::fix_length(length),
            PayloadSize::Empty => PayloadDecoder::empty(),
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self {
            PayloadDecoder::Length(decoder) => decoder.decode(src),
            PayloadDecoder::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self {
            PayloadDecoder::Length(decoder) => decoder.decode_eof(src),
            PayloadDecoder::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }
}
