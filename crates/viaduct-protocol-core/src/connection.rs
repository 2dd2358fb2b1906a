use crate::codec::{read_varint, varint_len, write_varint, CodecError};
use bytes::{Buf, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read as _, Write as _};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

/// Vanilla's limit on a single frame.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 2_097_151;

/// A framed Minecraft protocol connection with optional compression.
pub struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    compression_threshold: Option<i32>,
    max_packet_size: usize,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            compression_threshold: None,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    /// Split the connection into read and write halves.
    pub fn into_split(self) -> (ConnectionReader, ConnectionWriter) {
        let (read_half, write_half) = self.stream.into_split();
        (
            ConnectionReader {
                stream: read_half,
                read_buf: self.read_buf,
                compression_threshold: self.compression_threshold,
                max_packet_size: self.max_packet_size,
            },
            ConnectionWriter {
                stream: write_half,
                compression_threshold: self.compression_threshold,
            },
        )
    }
}

/// Read half of a split connection.
pub struct ConnectionReader {
    stream: OwnedReadHalf,
    read_buf: BytesMut,
    compression_threshold: Option<i32>,
    max_packet_size: usize,
}

impl ConnectionReader {
    /// Enable (or disable, with `None`) zlib framing for incoming packets.
    pub fn set_compression(&mut self, threshold: Option<i32>) {
        self.compression_threshold = threshold;
    }

    /// Read a single packet frame, returning (packet_id, payload).
    ///
    /// Cancel-safe: bytes are only consumed from the socket into the internal
    /// buffer, so dropping the future inside `select!` loses nothing.
    pub async fn read_packet(&mut self) -> anyhow::Result<(i32, BytesMut)> {
        loop {
            if let Some(result) = try_parse_packet(
                &mut self.read_buf,
                self.compression_threshold,
                self.max_packet_size,
            )? {
                return Ok(result);
            }
            let mut tmp = [0u8; 4096];
            let n = self.stream.read(&mut tmp).await?;
            if n == 0 {
                return Err(anyhow::anyhow!("Connection closed"));
            }
            self.read_buf.extend_from_slice(&tmp[..n]);
        }
    }
}

/// Write half of a split connection.
pub struct ConnectionWriter {
    stream: OwnedWriteHalf,
    compression_threshold: Option<i32>,
}

impl ConnectionWriter {
    /// Enable (or disable, with `None`) zlib framing for outgoing packets.
    pub fn set_compression(&mut self, threshold: Option<i32>) {
        self.compression_threshold = threshold;
    }

    /// Write a packet with the given ID and payload.
    pub async fn write_packet(&mut self, packet_id: i32, payload: &[u8]) -> anyhow::Result<()> {
        let mut packet_buf = BytesMut::with_capacity(payload.len() + 5);
        write_varint(&mut packet_buf, packet_id);
        packet_buf.extend_from_slice(payload);
        self.write_raw(&packet_buf).await
    }

    /// Write an already id-prefixed packet body.
    pub async fn write_raw(&mut self, packet: &[u8]) -> anyhow::Result<()> {
        let frame = build_frame(packet, self.compression_threshold)?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

// === Shared helpers ===

fn try_parse_packet(
    read_buf: &mut BytesMut,
    compression_threshold: Option<i32>,
    max_packet_size: usize,
) -> anyhow::Result<Option<(i32, BytesMut)>> {
    if read_buf.is_empty() {
        return Ok(None);
    }

    let mut peek = read_buf.clone();
    let length = match read_varint(&mut peek) {
        Ok(len) if len < 0 => anyhow::bail!("Negative frame length {}", len),
        Ok(len) => len as usize,
        Err(CodecError::NotEnoughData) => return Ok(None),
        Err(e) => return Err(anyhow::Error::from(e).context("frame length")),
    };
    if length > max_packet_size {
        anyhow::bail!("Frame of {} bytes exceeds limit {}", length, max_packet_size);
    }

    let varint_bytes = read_buf.len() - peek.len();

    if peek.remaining() < length {
        return Ok(None);
    }

    read_buf.advance(varint_bytes);
    let mut packet_data = read_buf.split_to(length);

    if compression_threshold.is_some() {
        let data_length = read_varint(&mut packet_data)?;
        if data_length < 0 || data_length as usize > max_packet_size {
            anyhow::bail!("Bad uncompressed length {}", data_length);
        }
        if data_length > 0 {
            let mut decompressed = vec![0u8; data_length as usize];
            let mut decoder = ZlibDecoder::new(&packet_data[..]);
            decoder.read_exact(&mut decompressed)?;
            packet_data = BytesMut::from(&decompressed[..]);
        }
    }

    let packet_id = read_varint(&mut packet_data)?;
    trace!(
        "Read packet id=0x{:02X} len={}",
        packet_id,
        packet_data.len()
    );

    Ok(Some((packet_id, packet_data)))
}

fn build_frame(packet: &[u8], compression_threshold: Option<i32>) -> anyhow::Result<BytesMut> {
    let mut frame = BytesMut::new();

    if let Some(threshold) = compression_threshold {
        let uncompressed_len = packet.len() as i32;
        if threshold >= 0 && uncompressed_len >= threshold {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(packet)?;
            let compressed = encoder.finish()?;

            let data_length_size = varint_len(uncompressed_len);
            let total_length = data_length_size + compressed.len();
            write_varint(&mut frame, total_length as i32);
            write_varint(&mut frame, uncompressed_len);
            frame.extend_from_slice(&compressed);
        } else {
            let total_length = 1 + packet.len();
            write_varint(&mut frame, total_length as i32);
            write_varint(&mut frame, 0);
            frame.extend_from_slice(packet);
        }
    } else {
        write_varint(&mut frame, packet.len() as i32);
        frame.extend_from_slice(packet);
    }

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(id: i32, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, id);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_plain_frame() {
        let mut buf = build_frame(&packet(0x0F, b"abc"), None).unwrap();
        assert_eq!(buf[0], 4);
        let (id, payload) = try_parse_packet(&mut buf, None, DEFAULT_MAX_PACKET_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(id, 0x0F);
        assert_eq!(&payload[..], b"abc");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_compressed_frame() {
        let payload = vec![7u8; 600];
        let mut buf = build_frame(&packet(0x21, &payload), Some(256)).unwrap();
        assert!(buf.len() < payload.len());
        let (id, decoded) = try_parse_packet(&mut buf, Some(256), DEFAULT_MAX_PACKET_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(id, 0x21);
        assert_eq!(decoded.to_vec(), payload);
    }

    #[test]
    fn test_below_threshold_is_stored() {
        let mut buf = build_frame(&packet(0x01, b"x"), Some(256)).unwrap();
        assert_eq!(&buf[..3], &[3, 0, 1]);
        let (id, payload) = try_parse_packet(&mut buf, Some(256), DEFAULT_MAX_PACKET_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(id, 0x01);
        assert_eq!(&payload[..], b"x");
    }

    #[test]
    fn test_partial_frame_waits() {
        let frame = build_frame(&packet(0x02, b"hello"), None).unwrap();
        let mut buf = BytesMut::from(&frame[..3]);
        assert!(try_parse_packet(&mut buf, None, DEFAULT_MAX_PACKET_SIZE)
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = build_frame(&packet(0x02, &[0; 64]), None).unwrap();
        assert!(try_parse_packet(&mut buf, None, 16).is_err());
    }

    #[test]
    fn test_overlong_length_prefix_rejected() {
        let mut buf = BytesMut::from(&[0xFF; 6][..]);
        assert!(try_parse_packet(&mut buf, None, DEFAULT_MAX_PACKET_SIZE).is_err());

        // an unfinished prefix still waits for more bytes
        let mut buf = BytesMut::from(&[0xFF, 0xFF][..]);
        assert!(try_parse_packet(&mut buf, None, DEFAULT_MAX_PACKET_SIZE)
            .unwrap()
            .is_none());
    }
}
