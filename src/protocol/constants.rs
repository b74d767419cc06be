//! RTMP protocol constants

/// RTMP message type ids
pub const MSG_TYPE_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_TYPE_ABORT: u8 = 2;
pub const MSG_TYPE_ACKNOWLEDGEMENT: u8 = 3;
pub const MSG_TYPE_USER_CONTROL: u8 = 4;
pub const MSG_TYPE_WINDOW_ACK_SIZE: u8 = 5;
pub const MSG_TYPE_SET_PEER_BW: u8 = 6;
pub const MSG_TYPE_AUDIO: u8 = 8;
pub const MSG_TYPE_VIDEO: u8 = 9;
pub const MSG_TYPE_AMF3_DATA: u8 = 15;
pub const MSG_TYPE_AMF3_SHARED_OBJECT: u8 = 16;
pub const MSG_TYPE_AMF3_COMMAND: u8 = 17;
pub const MSG_TYPE_AMF0_DATA: u8 = 18;
pub const MSG_TYPE_AMF0_SHARED_OBJECT: u8 = 19;
pub const MSG_TYPE_AMF0_COMMAND: u8 = 20;

/// Well-known chunk stream assignments for outbound messages
pub const CHUNK_STREAM_PROTOCOL: u32 = 2;
pub const CHUNK_STREAM_COMMAND: u32 = 3;
pub const CHUNK_STREAM_AUDIO: u32 = 4;
pub const CHUNK_STREAM_VIDEO: u32 = 5;
pub const CHUNK_STREAM_SCRIPT: u32 = 6;

/// The only version byte this profile speaks
pub const RTMP_VERSION: u8 = 0x03;

/// C1/S1/C2/S2 packet size in bytes
pub const HANDSHAKE_SIZE: usize = 1536;

/// Chunk size before either side sends Set Chunk Size
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Largest chunk size a Set Chunk Size payload may carry
pub const MAX_CHUNK_SIZE: u32 = 0xFF_FFFF;

/// 24-bit timestamp field value that signals a 4-byte extension
pub const EXTENDED_TIMESTAMP_THRESHOLD: u32 = 0xFF_FFFF;

/// Status code strings sent to peers
pub const STATUS_CONNECT_SUCCESS: &str = "NetConnection.Connect.Success";
pub const STATUS_PUBLISH_START: &str = "NetStream.Publish.Start";
pub const STATUS_PUBLISH_BAD_NAME: &str = "NetStream.Publish.BadName";
pub const STATUS_UNPUBLISH_SUCCESS: &str = "NetStream.Unpublish.Success";
pub const STATUS_PLAY_RESET: &str = "NetStream.Play.Reset";
pub const STATUS_PLAY_START: &str = "NetStream.Play.Start";
pub const STATUS_PLAY_FAILED: &str = "NetStream.Play.Failed";

/// Map a message type id to its well-known outbound chunk stream.
pub fn chunk_stream_for(type_id: u8) -> u32 {
    match type_id {
        MSG_TYPE_AUDIO => CHUNK_STREAM_AUDIO,
        MSG_TYPE_VIDEO => CHUNK_STREAM_VIDEO,
        MSG_TYPE_AMF0_DATA => CHUNK_STREAM_SCRIPT,
        MSG_TYPE_AMF0_COMMAND => CHUNK_STREAM_COMMAND,
        MSG_TYPE_SET_CHUNK_SIZE
        | MSG_TYPE_ABORT
        | MSG_TYPE_ACKNOWLEDGEMENT
        | MSG_TYPE_USER_CONTROL
        | MSG_TYPE_WINDOW_ACK_SIZE
        | MSG_TYPE_SET_PEER_BW => CHUNK_STREAM_PROTOCOL,
        _ => CHUNK_STREAM_COMMAND,
    }
}
