//! Packet framing over any byte stream.
//!
//! The reader accumulates bytes until a complete frame is buffered,
//! surviving short reads mid-header via the resumable variable byte
//! integer decoder, then hands the exact frame to the codec.

use bytes::BytesMut;
use mqtt_duplex_protocol::encoding::IncrementalVarInt;
use mqtt_duplex_protocol::{MqttError, Packet, ProtocolVersion, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 4096;

pub struct PacketReader<R> {
    reader: R,
    buf: BytesMut,
    protocol_version: ProtocolVersion,
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    #[must_use]
    pub fn new(reader: R, protocol_version: ProtocolVersion) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(READ_CHUNK),
            protocol_version,
        }
    }

    /// Reads one complete control packet, waiting for more bytes as
    /// needed. A clean EOF surfaces as
    /// [`MqttError::ConnectionClosedByPeer`].
    pub async fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if let Some(frame_len) = complete_frame_len(&self.buf)? {
                if self.buf.len() >= frame_len {
                    let mut frame = self.buf.split_to(frame_len);
                    return Packet::decode(&mut frame, self.protocol_version);
                }
            }

            let n = self.reader.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(MqttError::ConnectionClosedByPeer);
            }
        }
    }
}

/// Total frame length once the fixed header is fully buffered, `None`
/// while more header bytes are needed.
fn complete_frame_len(buf: &[u8]) -> Result<Option<usize>> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let mut decoder = IncrementalVarInt::new();
    for (offset, &byte) in buf[1..].iter().enumerate() {
        if let Some(remaining) = decoder.push(byte)? {
            let header_len = 1 + offset + 1;
            return Ok(Some(header_len + remaining as usize));
        }
    }
    Ok(None)
}

pub struct PacketWriter<W> {
    writer: W,
    buf: BytesMut,
}

impl<W: AsyncWrite + Unpin> PacketWriter<W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    pub async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.buf.clear();
        packet.encode(&mut self.buf)?;
        self.writer.write_all(&self.buf).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
