//! Framing adapter for tokio connections

use super::resp::{RespEncoder, RespParser};
use super::types::RespValue;
use crate::error::Error;
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

/// RESP framing: commands out, replies in
#[derive(Debug, Default, Clone, Copy)]
pub struct RespCodec;

impl Decoder for RespCodec {
    type Item = RespValue;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RespValue>, Error> {
        Ok(RespParser::parse(src)?)
    }
}

impl Encoder<RespValue> for RespCodec {
    type Error = Error;

    fn encode(&mut self, item: RespValue, dst: &mut BytesMut) -> Result<(), Error> {
        RespEncoder::encode_to(dst, &item);
        Ok(())
    }
}
