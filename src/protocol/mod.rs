//! RTMP protocol engine
//!
//! The chunk-stream codec (reader/writer), the handshake, and the wire
//! constants. Everything above this module deals in whole [`chunk::Message`]s.

pub mod chunk;
pub mod constants;
pub mod handshake;
pub mod reader;
pub mod writer;

pub use chunk::{BasicHeader, Message, MessageHeader};
pub use reader::MessageReader;
pub use writer::{MessageWriter, OutboundMessage};
