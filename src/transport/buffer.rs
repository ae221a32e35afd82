//! Per-connection decoder state
//!
//! Bytes arrive in arbitrary chunks; whatever a decode step does not consume
//! stays in the buffer for the next chunk.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Carry-over buffer driving a frame decoder
pub struct FrameBuffer<C> {
    codec: C,
    buffer: BytesMut,
}

impl<C: Decoder> FrameBuffer<C> {
    /// Create an empty buffer around a decoder
    pub fn new(codec: C) -> Self {
        FrameBuffer {
            codec,
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Append a chunk and return every frame it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<C::Item>, C::Error> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Decode one frame from the buffered bytes, if complete
    pub fn next_frame(&mut self) -> Result<Option<C::Item>, C::Error> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        self.codec.decode(&mut self.buffer)
    }

    /// Number of buffered bytes not yet decoded
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    pub(crate) fn codec_mut(&mut self) -> &mut C {
        &mut self.codec
    }
}
