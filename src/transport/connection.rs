//! Connection handling
//!
//! One connection per node write. Replies are decoded from a carry-over
//! buffer, so several commands may be written before their replies are read.

use super::buffer::FrameBuffer;
use crate::error::{Error, Result};
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

/// Client connection to one cache node
pub struct Connection<S, C> {
    /// Underlying stream
    stream: S,

    /// Carry-over buffer and decoder for replies
    frames: FrameBuffer<C>,

    /// Write buffer
    write_buffer: BytesMut,

    /// Peer address, for logging and error messages
    peer: String,

    /// Upper bound for every reply wait
    timeout: Duration,
}

impl<C> Connection<TcpStream, C>
where
    C: Decoder<Error = Error>,
{
    /// Open a TCP connection to `addr`
    pub async fn connect(addr: &str, codec: C, limit: Duration) -> Result<Self> {
        let stream = match timeout(limit, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(Error::connection(format!("failed to connect to {}: {}", addr, e)))
            }
            Err(_) => return Err(Error::connection(format!("timed out connecting to {}", addr))),
        };
        stream.set_nodelay(true)?;
        debug!("Connected to {}", addr);

        Ok(Connection::new(stream, codec, addr, limit))
    }
}

impl<S, C> Connection<S, C>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Decoder<Error = Error>,
{
    /// Wrap an established stream
    pub fn new(stream: S, codec: C, peer: impl Into<String>, limit: Duration) -> Self {
        Connection {
            stream,
            frames: FrameBuffer::new(codec),
            write_buffer: BytesMut::with_capacity(4096),
            peer: peer.into(),
            timeout: limit,
        }
    }

    /// Peer address
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Encode and write a batch of commands in one flush
    pub async fn send_all<I>(&mut self, items: impl IntoIterator<Item = I>) -> Result<()>
    where
        C: Encoder<I, Error = Error>,
    {
        self.write_buffer.clear();
        for item in items {
            self.frames.codec_mut().encode(item, &mut self.write_buffer)?;
        }

        self.stream.write_all(&self.write_buffer).await?;
        self.stream.flush().await?;
        debug!("Wrote {} bytes to {}", self.write_buffer.len(), self.peer);

        Ok(())
    }

    /// Encode and write one command
    pub async fn send<I>(&mut self, item: I) -> Result<()>
    where
        C: Encoder<I, Error = Error>,
    {
        self.send_all(std::iter::once(item)).await
    }

    /// Wait for the next complete reply
    ///
    /// Returns Ok(None) when the peer closes before a whole reply arrived.
    pub async fn read_frame(&mut self) -> Result<Option<C::Item>> {
        match timeout(self.timeout, self.read_frame_inner()).await {
            Ok(result) => result,
            Err(_) => Err(Error::connection(format!(
                "timed out waiting for a reply from {}",
                self.peer
            ))),
        }
    }

    async fn read_frame_inner(&mut self) -> Result<Option<C::Item>> {
        loop {
            if let Some(frame) = self.frames.next_frame()? {
                return Ok(Some(frame));
            }

            let n = self.stream.read_buf(self.frames.buffer_mut()).await?;

            // Connection closed
            if n == 0 {
                if self.frames.pending() > 0 {
                    debug!(
                        "{} closed with {} unparsed bytes",
                        self.peer,
                        self.frames.pending()
                    );
                }
                return Ok(None);
            }

            debug!("Read {} bytes from {}", n, self.peer);
        }
    }

    /// Send one command and wait for its reply
    pub async fn request<I>(&mut self, item: I) -> Result<C::Item>
    where
        C: Encoder<I, Error = Error>,
    {
        self.send(item).await?;
        self.expect_frame().await
    }

    /// Wait for a reply, treating an early close as a connection error
    pub async fn expect_frame(&mut self) -> Result<C::Item> {
        match self.read_frame().await? {
            Some(frame) => Ok(frame),
            None => Err(Error::connection(format!(
                "connection to {} closed before a full reply",
                self.peer
            ))),
        }
    }

    /// Shut the write side down and drop the connection
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Error closing connection to {}: {}", self.peer, e);
        }
    }
}
