//! Per-path stream record
//!
//! One entry per registered path: the publisher's handle, the attached
//! players, and the caches a late joiner needs (metadata, decoder
//! configs, GOP window).

use std::collections::HashMap;

use bytes::Bytes;

use crate::media::gop::{CachedFrame, GopBuffer};
use crate::session::{SessionHandle, SessionId};

/// Stream record keyed by `app/streamName`
pub struct StreamEntry {
    path: String,

    /// At most one publisher at any time
    pub(super) publisher: Option<SessionHandle>,

    /// Attached players, addressed by session identity
    pub(super) players: HashMap<SessionId, SessionHandle>,

    /// Encoded onMetaData body, replaced on every metadata message
    pub(super) metadata: Option<Bytes>,

    /// AVC decoder configuration (video sequence header)
    pub(super) avc_header: Option<CachedFrame>,

    /// AAC decoder configuration (audio sequence header)
    pub(super) aac_header: Option<CachedFrame>,

    /// Frames from the latest keyframe forward
    pub(super) gop: GopBuffer,
}

impl StreamEntry {
    pub(super) fn new(path: String, gop_max_frames: usize) -> Self {
        Self {
            path,
            publisher: None,
            players: HashMap::new(),
            metadata: None,
            avc_header: None,
            aac_header: None,
            gop: GopBuffer::new(gop_max_frames),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn has_publisher(&self) -> bool {
        self.publisher.is_some()
    }

    pub fn publisher_id(&self) -> Option<&SessionId> {
        self.publisher.as_ref().map(|h| &h.id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn gop_len(&self) -> usize {
        self.gop.len()
    }

    /// No publisher, no players, and nothing cached: safe to drop.
    pub fn is_idle(&self) -> bool {
        self.publisher.is_none()
            && self.players.is_empty()
            && self.metadata.is_none()
            && self.avc_header.is_none()
            && self.aac_header.is_none()
            && self.gop.is_empty()
    }

    /// Forget the publisher and every cache tied to its stream. Players
    /// stay attached and wait for the next publisher.
    pub(super) fn clear_publisher_state(&mut self) {
        self.publisher = None;
        self.metadata = None;
        self.avc_header = None;
        self.aac_header = None;
        self.gop.clear();
    }
}
