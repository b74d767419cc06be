//! Session events
//!
//! The internal bus between sessions and the registry. Sessions emit
//! these in the order they process inbound messages; the server event
//! loop consumes them serially, so per-path registry state never sees
//! concurrent updates.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;

use crate::amf::AmfValue;
use crate::media::FrameClass;
use crate::session::{SessionHandle, SessionId};

/// Everything a session can tell the server
#[derive(Debug)]
pub enum SessionEvent {
    /// A connection was accepted; the server registers the handle
    ConnectionOpened {
        session: SessionHandle,
        peer_addr: SocketAddr,
    },

    /// `publish` accepted by the session state machine
    PublishStarted {
        session_id: SessionId,
        path: String,
        stream_id: u32,
    },

    /// Publishing ended (FCUnpublish, deleteStream/closeStream, or close)
    PublishStopped {
        session_id: SessionId,
        path: String,
        stream_id: u32,
    },

    /// `play` accepted by the session state machine
    PlayStarted {
        session_id: SessionId,
        path: String,
        stream_id: u32,
    },

    /// Playback ended
    PlayStopped {
        session_id: SessionId,
        path: String,
        stream_id: u32,
    },

    /// One audio message from a publisher, payload slices untouched
    AudioData {
        session_id: SessionId,
        path: String,
        timestamp: u32,
        payload: Vec<Bytes>,
    },

    /// One video message from a publisher
    VideoData {
        session_id: SessionId,
        path: String,
        timestamp: u32,
        frame_class: FrameClass,
        payload: Vec<Bytes>,
    },

    /// Decoded onMetaData object
    Metadata {
        session_id: SessionId,
        path: String,
        metadata: HashMap<String, AmfValue>,
    },

    /// The session's reader task exited; the server forgets the handle
    SessionTerminated { session_id: SessionId },
}
