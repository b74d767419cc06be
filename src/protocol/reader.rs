//! Chunk-stream decoder
//!
//! Reads chunks off the transport and reassembles logical messages. Per
//! chunk stream the reader keeps the last fully-reconstructed message
//! header (for fmt 1-3 inheritance) and the in-flight payload slices; a
//! message surfaces once the accumulated payload reaches the declared
//! length.

use std::collections::HashMap;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProtocolError, Result};
use crate::protocol::chunk::{BasicHeader, Message, MessageHeader};
use crate::protocol::constants::{DEFAULT_CHUNK_SIZE, EXTENDED_TIMESTAMP_THRESHOLD};

/// Per-chunk-stream decode state
#[derive(Debug, Default)]
struct ChunkStreamState {
    header: MessageHeader,
    have_header: bool,
    payload: Vec<bytes::Bytes>,
    accumulated: u32,
}

/// Stateful message decoder for one connection's inbound side
#[derive(Debug)]
pub struct MessageReader {
    streams: HashMap<u32, ChunkStreamState>,
    chunk_size: u32,
    /// Scratch buffer the next chunk payload is read into; completed
    /// slices are split off and their ownership moves into the message
    scratch: BytesMut,
}

impl MessageReader {
    pub fn new() -> Self {
        Self {
            streams: HashMap::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            scratch: BytesMut::with_capacity(DEFAULT_CHUNK_SIZE as usize),
        }
    }

    /// Update the inbound chunk size (from a Set Chunk Size message) and
    /// swap the scratch buffer to match.
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size;
        self.scratch = BytesMut::with_capacity(size as usize);
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Drop the partial accumulator for a chunk stream (Abort message).
    pub fn abort(&mut self, csid: u32) {
        if let Some(state) = self.streams.get_mut(&csid) {
            state.payload.clear();
            state.accumulated = 0;
        }
    }

    /// Read chunks until a logical message completes.
    pub async fn read_message<R>(&mut self, r: &mut R) -> Result<Message>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            if let Some(message) = self.read_chunk(r).await? {
                return Ok(message);
            }
        }
    }

    async fn read_chunk<R>(&mut self, r: &mut R) -> Result<Option<Message>>
    where
        R: AsyncRead + Unpin,
    {
        let basic = read_basic_header(r).await?;

        if basic.fmt != 0 && !self.streams.get(&basic.csid).is_some_and(|s| s.have_header) {
            return Err(ProtocolError::NoPriorHeader(basic.csid).into());
        }

        let fields = read_header_fields(r, basic.fmt).await?;
        let chunk_size = self.chunk_size;

        let state = self.streams.entry(basic.csid).or_default();
        match fields {
            HeaderFields::Full {
                timestamp,
                length,
                type_id,
                stream_id,
            } => {
                state.header = MessageHeader {
                    timestamp,
                    length,
                    type_id,
                    stream_id,
                };
            }
            HeaderFields::Medium {
                delta,
                length,
                type_id,
            } => {
                state.header.timestamp = apply_delta(state.header.timestamp, delta, basic.csid);
                state.header.length = length;
                state.header.type_id = type_id;
            }
            HeaderFields::Small { delta } => {
                state.header.timestamp = apply_delta(state.header.timestamp, delta, basic.csid);
            }
            // fmt=3: inherit everything, timestamp stays at the
            // previously computed value
            HeaderFields::None => {}
        }
        state.have_header = true;

        let to_read = state
            .header
            .length
            .saturating_sub(state.accumulated)
            .min(chunk_size) as usize;

        if to_read > 0 {
            self.scratch.resize(to_read, 0);
            r.read_exact(&mut self.scratch[..]).await?;
            let slice = self.scratch.split().freeze();
            state.accumulated += slice.len() as u32;
            state.payload.push(slice);
        }

        if state.accumulated == state.header.length {
            let message = Message::new(state.header, std::mem::take(&mut state.payload));
            state.accumulated = 0;
            return Ok(Some(message));
        }

        Ok(None)
    }
}

/// Header fields as they appear on the wire for each fmt
enum HeaderFields {
    Full {
        timestamp: u32,
        length: u32,
        type_id: u8,
        stream_id: u32,
    },
    Medium {
        delta: u32,
        length: u32,
        type_id: u8,
    },
    Small {
        delta: u32,
    },
    None,
}

async fn read_header_fields<R>(r: &mut R, fmt: u8) -> Result<HeaderFields>
where
    R: AsyncRead + Unpin,
{
    match fmt {
        0 => {
            let mut buf = [0u8; 11];
            r.read_exact(&mut buf).await?;

            let mut timestamp = read_u24_be(&buf[0..3]);
            let length = read_u24_be(&buf[3..6]);
            let type_id = buf[6];
            let stream_id = u32::from_le_bytes([buf[7], buf[8], buf[9], buf[10]]);

            if timestamp == EXTENDED_TIMESTAMP_THRESHOLD {
                timestamp = read_extended_timestamp(r).await?;
            }

            Ok(HeaderFields::Full {
                timestamp,
                length,
                type_id,
                stream_id,
            })
        }
        1 => {
            let mut buf = [0u8; 7];
            r.read_exact(&mut buf).await?;

            let mut delta = read_u24_be(&buf[0..3]);
            if delta == EXTENDED_TIMESTAMP_THRESHOLD {
                delta = read_extended_timestamp(r).await?;
            }

            Ok(HeaderFields::Medium {
                delta,
                length: read_u24_be(&buf[3..6]),
                type_id: buf[6],
            })
        }
        2 => {
            let mut buf = [0u8; 3];
            r.read_exact(&mut buf).await?;

            let mut delta = read_u24_be(&buf);
            if delta == EXTENDED_TIMESTAMP_THRESHOLD {
                delta = read_extended_timestamp(r).await?;
            }

            Ok(HeaderFields::Small { delta })
        }
        _ => Ok(HeaderFields::None),
    }
}

impl Default for MessageReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulate a timestamp delta with 32-bit wrap, clamping readings that
/// move backwards without being near the wrap boundary.
fn apply_delta(prev: u32, delta: u32, csid: u32) -> u32 {
    let new = prev.wrapping_add(delta);

    if delta != 0 && new <= prev {
        let prev_in_wrap_region = prev >= u32::MAX - EXTENDED_TIMESTAMP_THRESHOLD;
        let new_in_wrap_region = new <= EXTENDED_TIMESTAMP_THRESHOLD;
        if !prev_in_wrap_region && !new_in_wrap_region {
            tracing::warn!(
                csid = csid,
                prev = prev,
                delta = delta,
                computed = new,
                "non-monotonic timestamp, clamping to prev + 1"
            );
            return prev.wrapping_add(1);
        }
    }

    new
}

async fn read_basic_header<R>(r: &mut R) -> Result<BasicHeader>
where
    R: AsyncRead + Unpin,
{
    let first = read_u8(r).await?;
    let fmt = first >> 6;
    let low = u32::from(first & 0x3F);

    let csid = match low {
        0 => 64 + u32::from(read_u8(r).await?),
        1 => {
            let mut buf = [0u8; 2];
            r.read_exact(&mut buf).await?;
            64 + u32::from(u16::from_le_bytes(buf))
        }
        _ => low,
    };

    Ok(BasicHeader { fmt, csid })
}

async fn read_extended_timestamp<R>(r: &mut R) -> Result<u32>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).await?;
    Ok(u32::from_be_bytes(buf))
}

async fn read_u8<R>(r: &mut R) -> Result<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf).await?;
    Ok(buf[0])
}

fn read_u24_be(buf: &[u8]) -> u32 {
    u32::from(buf[0]) << 16 | u32::from(buf[1]) << 8 | u32::from(buf[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn put_u24(buf: &mut Vec<u8>, v: u32) {
        buf.push((v >> 16) as u8);
        buf.push((v >> 8) as u8);
        buf.push(v as u8);
    }

    /// fmt=0 chunk on csid 3 with the given header fields and payload
    fn fmt0_chunk(csid: u8, ts: u32, type_id: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(csid & 0x3F);
        put_u24(&mut buf, ts.min(EXTENDED_TIMESTAMP_THRESHOLD));
        put_u24(&mut buf, payload.len() as u32);
        buf.push(type_id);
        buf.put_u32_le(stream_id);
        if ts >= EXTENDED_TIMESTAMP_THRESHOLD {
            buf.put_u32(ts);
        }
        buf.extend_from_slice(payload);
        buf
    }

    fn fmt1_chunk(csid: u8, delta: u32, type_id: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(0x40 | (csid & 0x3F));
        put_u24(&mut buf, delta.min(EXTENDED_TIMESTAMP_THRESHOLD));
        put_u24(&mut buf, payload.len() as u32);
        buf.push(type_id);
        if delta >= EXTENDED_TIMESTAMP_THRESHOLD {
            buf.put_u32(delta);
        }
        buf.extend_from_slice(payload);
        buf
    }

    fn fmt2_chunk(csid: u8, delta: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(0x80 | (csid & 0x3F));
        put_u24(&mut buf, delta);
        buf.extend_from_slice(payload);
        buf
    }

    #[tokio::test]
    async fn test_single_chunk_message() {
        let data = fmt0_chunk(3, 100, 20, 0, b"hello");
        let mut reader = MessageReader::new();

        let msg = reader.read_message(&mut data.as_slice()).await.unwrap();
        assert_eq!(msg.header.timestamp, 100);
        assert_eq!(msg.header.type_id, 20);
        assert_eq!(msg.header.stream_id, 0);
        assert_eq!(&msg.payload_bytes()[..], b"hello");
    }

    #[tokio::test]
    async fn test_multi_chunk_reassembly() {
        // 300-byte message at default chunk size 128: 128 + 128 + 44
        let payload: Vec<u8> = (0..300).map(|i| i as u8).collect();

        let mut data = Vec::new();
        data.push(0x05); // fmt=0, csid=5
        put_u24(&mut data, 40);
        put_u24(&mut data, 300);
        data.push(9);
        data.put_u32_le(1);
        data.extend_from_slice(&payload[..128]);
        data.push(0xC0 | 0x05); // fmt=3 continuation
        data.extend_from_slice(&payload[128..256]);
        data.push(0xC0 | 0x05);
        data.extend_from_slice(&payload[256..]);

        let mut reader = MessageReader::new();
        let msg = reader.read_message(&mut data.as_slice()).await.unwrap();

        assert_eq!(msg.header.timestamp, 40);
        assert_eq!(msg.payload_len(), 300);
        assert_eq!(msg.payload.len(), 3); // slices, not concatenated
        assert_eq!(&msg.payload_bytes()[..], &payload[..]);
    }

    #[tokio::test]
    async fn test_large_message_at_raised_chunk_size() {
        // 12288-byte video message at chunk size 4096: fmt=0 + two fmt=3
        let payload = vec![0xABu8; 12_288];

        let mut data = Vec::new();
        data.push(0x05);
        put_u24(&mut data, 1000);
        put_u24(&mut data, 12_288);
        data.push(9);
        data.put_u32_le(1);
        data.extend_from_slice(&payload[..4096]);
        for i in 1..3 {
            data.push(0xC0 | 0x05);
            data.extend_from_slice(&payload[i * 4096..(i + 1) * 4096]);
        }

        let mut reader = MessageReader::new();
        reader.set_chunk_size(4096);
        let msg = reader.read_message(&mut data.as_slice()).await.unwrap();

        assert_eq!(msg.header.timestamp, 1000);
        assert_eq!(msg.payload_len(), 12_288);
    }

    #[tokio::test]
    async fn test_fmt1_inherits_stream_id() {
        let mut data = fmt0_chunk(3, 0, 20, 7, b"aa");
        data.extend(fmt1_chunk(3, 10, 20, b"bb"));

        let mut reader = MessageReader::new();
        let mut stream = data.as_slice();
        let first = reader.read_message(&mut stream).await.unwrap();
        let second = reader.read_message(&mut stream).await.unwrap();

        assert_eq!(first.header.stream_id, 7);
        assert_eq!(second.header.stream_id, 7);
        assert_eq!(second.header.timestamp, 10);
    }

    #[tokio::test]
    async fn test_fmt2_inherits_length_and_type() {
        let mut data = fmt0_chunk(3, 100, 8, 1, b"xyz");
        data.extend(fmt2_chunk(3, 25, b"pqr"));

        let mut reader = MessageReader::new();
        let mut stream = data.as_slice();
        let first = reader.read_message(&mut stream).await.unwrap();
        let second = reader.read_message(&mut stream).await.unwrap();

        assert_eq!(second.header.length, first.header.length);
        assert_eq!(second.header.type_id, first.header.type_id);
        assert_eq!(second.header.stream_id, first.header.stream_id);
        assert_eq!(second.header.timestamp, 125);
    }

    #[tokio::test]
    async fn test_delta_accumulation() {
        // t0=50, deltas 10, 20, 30 => 50, 60, 80, 110
        let mut data = fmt0_chunk(4, 50, 8, 1, b"a");
        data.extend(fmt1_chunk(4, 10, 8, b"b"));
        data.extend(fmt2_chunk(4, 20, b"c"));
        data.extend(fmt2_chunk(4, 30, b"d"));

        let mut reader = MessageReader::new();
        let mut stream = data.as_slice();
        let mut timestamps = Vec::new();
        for _ in 0..4 {
            timestamps.push(reader.read_message(&mut stream).await.unwrap().header.timestamp);
        }
        assert_eq!(timestamps, vec![50, 60, 80, 110]);
    }

    #[tokio::test]
    async fn test_extended_timestamp_decode() {
        let ts = 0x0100_0000; // above the 24-bit threshold
        let data = fmt0_chunk(3, ts, 20, 0, b"x");

        let mut reader = MessageReader::new();
        let msg = reader.read_message(&mut data.as_slice()).await.unwrap();
        assert_eq!(msg.header.timestamp, ts);
    }

    #[tokio::test]
    async fn test_extended_delta_decode() {
        let mut data = fmt0_chunk(3, 0, 8, 1, b"a");
        data.extend(fmt1_chunk(3, 0x0100_0000, 8, b"b"));

        let mut reader = MessageReader::new();
        let mut stream = data.as_slice();
        reader.read_message(&mut stream).await.unwrap();
        let second = reader.read_message(&mut stream).await.unwrap();
        assert_eq!(second.header.timestamp, 0x0100_0000);
    }

    #[tokio::test]
    async fn test_csid_two_byte_form() {
        // csid 70 in the 0-indirection form: 64 + 6
        let mut data = vec![0x00, 6];
        put_u24(&mut data, 0);
        put_u24(&mut data, 1);
        data.push(20);
        data.put_u32_le(0);
        data.push(0x55);

        let mut reader = MessageReader::new();
        let msg = reader.read_message(&mut data.as_slice()).await.unwrap();
        assert_eq!(msg.payload_bytes()[0], 0x55);
    }

    #[tokio::test]
    async fn test_csid_three_byte_form() {
        // csid 1000 in the 1-indirection form: 64 + 936 (LE)
        let mut data = vec![0x01];
        data.put_u16_le(936);
        put_u24(&mut data, 0);
        put_u24(&mut data, 1);
        data.push(20);
        data.put_u32_le(0);
        data.push(0x66);

        let mut reader = MessageReader::new();
        let msg = reader.read_message(&mut data.as_slice()).await.unwrap();
        assert_eq!(msg.payload_bytes()[0], 0x66);
    }

    #[tokio::test]
    async fn test_fmt1_without_prior_header_rejected() {
        let data = fmt1_chunk(3, 10, 20, b"x");
        let mut reader = MessageReader::new();

        let err = reader.read_message(&mut data.as_slice()).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Protocol(ProtocolError::NoPriorHeader(3))
        ));
    }

    #[tokio::test]
    async fn test_truncated_stream_fails() {
        let mut data = fmt0_chunk(3, 0, 20, 0, b"hello");
        data.truncate(data.len() - 2);

        let mut reader = MessageReader::new();
        assert!(reader.read_message(&mut data.as_slice()).await.is_err());
    }

    #[tokio::test]
    async fn test_abort_drops_accumulator() {
        // First chunk of a 200-byte message, then abort, then a complete
        // message on the same csid
        let payload = vec![1u8; 200];
        let mut data = Vec::new();
        data.push(0x03);
        put_u24(&mut data, 0);
        put_u24(&mut data, 200);
        data.push(20);
        data.put_u32_le(0);
        data.extend_from_slice(&payload[..128]);

        let mut reader = MessageReader::new();
        let mut stream = data.as_slice();
        // Partial chunk consumed, no message yet
        assert!(reader.read_chunk(&mut stream).await.unwrap().is_none());

        reader.abort(3);

        let fresh = fmt0_chunk(3, 5, 20, 0, b"ok");
        let msg = reader.read_message(&mut fresh.as_slice()).await.unwrap();
        assert_eq!(&msg.payload_bytes()[..], b"ok");
    }

    #[test]
    fn test_clamp_non_monotonic() {
        // Backwards step with both values far from the wrap boundary
        let clamped = apply_delta(3_000_000_000, 0x8000_0000, 3);
        assert_eq!(clamped, 3_000_000_001);
    }

    #[test]
    fn test_wrap_region_passes_through() {
        // Genuine wrap: prev near u32::MAX, small delta lands near zero
        let prev = u32::MAX - 10;
        let new = apply_delta(prev, 20, 3);
        assert_eq!(new, prev.wrapping_add(20));
    }
}
