//! Chunk-stream encoder
//!
//! Serializes logical messages into chunks. The first chunk carries a
//! full fmt=0 header; continuations of the same message use fmt=3 (no
//! header). The chunk stream id is derived from the message type through
//! the well-known assignment, and payload slices are forwarded in order
//! without concatenation.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::protocol::constants::{
    chunk_stream_for, DEFAULT_CHUNK_SIZE, EXTENDED_TIMESTAMP_THRESHOLD, MSG_TYPE_AMF0_COMMAND,
    MSG_TYPE_AMF0_DATA, MSG_TYPE_AUDIO, MSG_TYPE_SET_CHUNK_SIZE, MSG_TYPE_VIDEO,
};

/// A logical message queued for the wire
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub type_id: u8,
    pub stream_id: u32,
    pub timestamp: u32,
    pub payload: Vec<Bytes>,
}

impl OutboundMessage {
    pub fn payload_len(&self) -> usize {
        self.payload.iter().map(Bytes::len).sum()
    }
}

/// Stateful message encoder for one connection's outbound side
#[derive(Debug)]
pub struct MessageWriter {
    chunk_size: u32,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Write a logical message as a fmt=0 chunk plus fmt=3 continuations.
    pub async fn write_message<W>(&self, w: &mut W, msg: &OutboundMessage) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let csid = chunk_stream_for(msg.type_id);
        let total = msg.payload_len() as u32;

        let mut header = BytesMut::with_capacity(18);
        put_basic_header(&mut header, 0, csid);
        put_u24(&mut header, msg.timestamp.min(EXTENDED_TIMESTAMP_THRESHOLD));
        put_u24(&mut header, total);
        header.put_u8(msg.type_id);
        header.put_u32_le(msg.stream_id);
        if msg.timestamp >= EXTENDED_TIMESTAMP_THRESHOLD {
            header.put_u32(msg.timestamp);
        }
        w.write_all(&header).await?;

        let mut room = self.chunk_size as usize;
        for slice in &msg.payload {
            let mut slice = slice.clone();
            while !slice.is_empty() {
                if room == 0 {
                    let mut cont = BytesMut::with_capacity(3);
                    put_basic_header(&mut cont, 3, csid);
                    w.write_all(&cont).await?;
                    room = self.chunk_size as usize;
                }
                let take = slice.len().min(room);
                w.write_all(&slice[..take]).await?;
                slice.advance(take);
                room -= take;
            }
        }

        Ok(())
    }

    /// Send a Set Chunk Size control message and adopt the new size for
    /// subsequent outbound messages.
    pub async fn write_set_chunk_size<W>(&mut self, w: &mut W, size: u32) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u32(size);

        self.write_message(
            w,
            &OutboundMessage {
                type_id: MSG_TYPE_SET_CHUNK_SIZE,
                stream_id: 0,
                timestamp: 0,
                payload: vec![payload.freeze()],
            },
        )
        .await?;

        self.chunk_size = size;
        Ok(())
    }

    /// Send an AMF0 command or status payload on the command chunk stream.
    pub async fn write_command<W>(&self, w: &mut W, payload: Bytes) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.write_message(
            w,
            &OutboundMessage {
                type_id: MSG_TYPE_AMF0_COMMAND,
                stream_id: 0,
                timestamp: 0,
                payload: vec![payload],
            },
        )
        .await
    }

    /// Send audio data to a player.
    pub async fn write_audio<W>(&self, w: &mut W, payload: Vec<Bytes>, timestamp: u32) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.write_message(
            w,
            &OutboundMessage {
                type_id: MSG_TYPE_AUDIO,
                stream_id: 0,
                timestamp,
                payload,
            },
        )
        .await
    }

    /// Send video data to a player.
    pub async fn write_video<W>(&self, w: &mut W, payload: Vec<Bytes>, timestamp: u32) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.write_message(
            w,
            &OutboundMessage {
                type_id: MSG_TYPE_VIDEO,
                stream_id: 0,
                timestamp,
                payload,
            },
        )
        .await
    }

    /// Send pre-encoded AMF0 script data (e.g. onMetaData).
    pub async fn write_script<W>(&self, w: &mut W, payload: Bytes) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.write_message(
            w,
            &OutboundMessage {
                type_id: MSG_TYPE_AMF0_DATA,
                stream_id: 0,
                timestamp: 0,
                payload: vec![payload],
            },
        )
        .await
    }
}

impl Default for MessageWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a basic header picking the minimum-length csid form.
fn put_basic_header(buf: &mut BytesMut, fmt: u8, csid: u32) {
    match csid {
        2..=63 => buf.put_u8(fmt << 6 | csid as u8),
        64..=319 => {
            buf.put_u8(fmt << 6);
            buf.put_u8((csid - 64) as u8);
        }
        _ => {
            buf.put_u8(fmt << 6 | 1);
            buf.put_u16_le((csid - 64) as u16);
        }
    }
}

fn put_u24(buf: &mut BytesMut, v: u32) {
    buf.put_u8((v >> 16) as u8);
    buf.put_u8((v >> 8) as u8);
    buf.put_u8(v as u8);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::reader::MessageReader;

    async fn roundtrip_at(chunk_size: u32, msg: &OutboundMessage) -> crate::protocol::chunk::Message {
        let mut wire = Vec::new();
        let mut writer = MessageWriter::new();
        if chunk_size != DEFAULT_CHUNK_SIZE {
            // Adopt the size without emitting the control message so the
            // byte stream contains only the message under test
            writer.chunk_size = chunk_size;
        }
        writer.write_message(&mut wire, msg).await.unwrap();

        let mut reader = MessageReader::new();
        reader.set_chunk_size(chunk_size);
        reader.read_message(&mut wire.as_slice()).await.unwrap()
    }

    fn sample_message(len: usize, timestamp: u32) -> OutboundMessage {
        let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        OutboundMessage {
            type_id: MSG_TYPE_VIDEO,
            stream_id: 1,
            timestamp,
            payload: vec![Bytes::from(payload)],
        }
    }

    #[tokio::test]
    async fn test_roundtrip_across_chunk_sizes() {
        for chunk_size in [128u32, 4096, 65536] {
            let msg = sample_message(10_000, 1234);
            let decoded = roundtrip_at(chunk_size, &msg).await;

            assert_eq!(decoded.header.timestamp, msg.timestamp);
            assert_eq!(decoded.header.length as usize, msg.payload_len());
            assert_eq!(decoded.header.type_id, msg.type_id);
            assert_eq!(decoded.header.stream_id, msg.stream_id);
            assert_eq!(decoded.payload_bytes(), msg.payload[0]);
        }
    }

    #[tokio::test]
    async fn test_roundtrip_empty_payload() {
        let msg = OutboundMessage {
            type_id: MSG_TYPE_AMF0_COMMAND,
            stream_id: 0,
            timestamp: 0,
            payload: vec![],
        };
        let decoded = roundtrip_at(128, &msg).await;
        assert_eq!(decoded.payload_len(), 0);
    }

    #[tokio::test]
    async fn test_roundtrip_multi_slice_payload() {
        // Slices survive the chunk split without reordering
        let msg = OutboundMessage {
            type_id: MSG_TYPE_AUDIO,
            stream_id: 0,
            timestamp: 7,
            payload: vec![
                Bytes::from(vec![1u8; 100]),
                Bytes::from(vec![2u8; 100]),
                Bytes::from(vec![3u8; 100]),
            ],
        };
        let decoded = roundtrip_at(128, &msg).await;

        let mut expected = vec![1u8; 100];
        expected.extend(vec![2u8; 100]);
        expected.extend(vec![3u8; 100]);
        assert_eq!(&decoded.payload_bytes()[..], &expected[..]);
    }

    #[tokio::test]
    async fn test_extended_timestamp_roundtrip() {
        let msg = sample_message(10, 0x0123_4567);
        let decoded = roundtrip_at(128, &msg).await;
        assert_eq!(decoded.header.timestamp, 0x0123_4567);
    }

    #[tokio::test]
    async fn test_timestamp_at_threshold_uses_extension() {
        // Exactly 0xFFFFFF must also take the 4-byte extension path
        let msg = sample_message(1, EXTENDED_TIMESTAMP_THRESHOLD);
        let decoded = roundtrip_at(128, &msg).await;
        assert_eq!(decoded.header.timestamp, EXTENDED_TIMESTAMP_THRESHOLD);
    }

    #[tokio::test]
    async fn test_set_chunk_size_payload_and_adoption() {
        let mut wire = Vec::new();
        let mut writer = MessageWriter::new();
        writer.write_set_chunk_size(&mut wire, 4096).await.unwrap();
        assert_eq!(writer.chunk_size(), 4096);

        let mut reader = MessageReader::new();
        let msg = reader.read_message(&mut wire.as_slice()).await.unwrap();
        assert_eq!(msg.header.type_id, MSG_TYPE_SET_CHUNK_SIZE);
        let payload = msg.payload_bytes();
        assert_eq!(u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]), 4096);
        // High bit clear
        assert_eq!(payload[0] & 0x80, 0);
    }

    #[test]
    fn test_basic_header_minimal_forms() {
        // Direct form
        let mut buf = BytesMut::new();
        put_basic_header(&mut buf, 0, 5);
        assert_eq!(&buf[..], &[0x05]);

        // Two-byte form
        let mut buf = BytesMut::new();
        put_basic_header(&mut buf, 3, 70);
        assert_eq!(&buf[..], &[0xC0, 6]);

        // Three-byte form (little-endian)
        let mut buf = BytesMut::new();
        put_basic_header(&mut buf, 0, 1000);
        assert_eq!(&buf[..], &[0x01, 0xA8, 0x03]);
    }

    #[tokio::test]
    async fn test_csid_encoding_equivalence() {
        // A csid expressed in each form decodes identically
        for (csid, encoded) in [
            (5u32, vec![0x05u8]),
            (70, vec![0x00, 6]),
            (1000, vec![0x01, 0xA8, 0x03]),
        ] {
            let mut wire = encoded;
            wire.extend_from_slice(&[0, 0, 0]); // ts
            wire.extend_from_slice(&[0, 0, 1]); // len
            wire.push(MSG_TYPE_AMF0_COMMAND);
            wire.extend_from_slice(&[0, 0, 0, 0]); // stream id
            wire.push(0x99);

            let mut reader = MessageReader::new();
            let msg = reader.read_message(&mut wire.as_slice()).await.unwrap();
            assert_eq!(msg.payload_bytes()[0], 0x99, "csid {csid}");
        }
    }

    #[test]
    fn test_chunk_stream_assignment() {
        assert_eq!(chunk_stream_for(MSG_TYPE_SET_CHUNK_SIZE), 2);
        assert_eq!(chunk_stream_for(MSG_TYPE_AMF0_COMMAND), 3);
        assert_eq!(chunk_stream_for(MSG_TYPE_AUDIO), 4);
        assert_eq!(chunk_stream_for(MSG_TYPE_VIDEO), 5);
        assert_eq!(chunk_stream_for(MSG_TYPE_AMF0_DATA), 6);
    }
}
