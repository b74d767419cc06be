//! Chunk-layer wire structures
//!
//! An RTMP connection multiplexes logical messages over chunk streams.
//! Each chunk carries a basic header (fmt + chunk stream id), a message
//! header whose size depends on fmt, and a payload slice of the logical
//! message. These types are shared by the reader and writer.

use bytes::{Bytes, BytesMut};

/// Basic header: fmt selector plus chunk stream id.
///
/// The csid is encoded in 1, 2 or 3 bytes; values 0 and 1 in the 6-bit
/// field are indirections for the longer encodings, so 2 is the smallest
/// legal address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicHeader {
    pub fmt: u8,
    pub csid: u32,
}

/// Fully-reconstructed message header for one chunk stream.
///
/// fmt 1-3 chunks inherit the missing fields from the previous header on
/// the same chunk stream; the reader stores the merged result here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    /// Absolute timestamp in milliseconds (wrapping u32)
    pub timestamp: u32,
    /// Declared payload length of the logical message
    pub length: u32,
    /// Message type id
    pub type_id: u8,
    /// Message stream id (little-endian on the wire)
    pub stream_id: u32,
}

/// A complete logical message reassembled from one or more chunks.
///
/// The payload is kept as the sequence of chunk-sized slices it arrived
/// in; ownership of each slice transfers from the reader's scratch buffer
/// into the message, so handing the message onward never copies media
/// bytes.
#[derive(Debug, Clone)]
pub struct Message {
    pub header: MessageHeader,
    pub payload: Vec<Bytes>,
}

impl Message {
    pub fn new(header: MessageHeader, payload: Vec<Bytes>) -> Self {
        Self { header, payload }
    }

    /// Total payload length across all slices
    pub fn payload_len(&self) -> usize {
        self.payload.iter().map(Bytes::len).sum()
    }

    /// Byte at a logical payload offset, crossing slice boundaries
    pub fn payload_byte(&self, mut index: usize) -> Option<u8> {
        for slice in &self.payload {
            if index < slice.len() {
                return Some(slice[index]);
            }
            index -= slice.len();
        }
        None
    }

    /// The payload as one contiguous buffer.
    ///
    /// Single-slice messages (the common case for commands) hand back a
    /// reference-counted clone; multi-slice messages are concatenated.
    pub fn payload_bytes(&self) -> Bytes {
        match self.payload.len() {
            0 => Bytes::new(),
            1 => self.payload[0].clone(),
            _ => {
                let mut buf = BytesMut::with_capacity(self.payload_len());
                for slice in &self.payload {
                    buf.extend_from_slice(slice);
                }
                buf.freeze()
            }
        }
    }
}
