//! Stream registry
//!
//! Maps each path to its stream record and performs fan-out. The server
//! event loop is the single owner: every operation here runs serially,
//! so per-path state never needs its own lock and event order within a
//! path is the order the registry saw.
//!
//! Delivery policy: live media is handed to each player with a
//! non-blocking send and dropped per-player when an inbox is full;
//! sequence headers, metadata, and the priming burst use an awaiting
//! send and are never dropped.

pub mod entry;

use std::collections::HashMap;

use bytes::Bytes;

use crate::amf::{self, AmfValue};
use crate::error::RegistryError;
use crate::media::flv::{is_aac_sequence_header, is_avc_sequence_header, FrameClass};
use crate::media::gop::{CachedFrame, FrameKind};
use crate::session::{Outbound, SessionHandle, SessionId};

pub use entry::StreamEntry;

/// Path-keyed stream records plus the bounds they enforce
pub struct StreamRegistry {
    streams: HashMap<String, StreamEntry>,
    gop_cache_max_frames: usize,
    max_players_per_path: usize,
}

impl StreamRegistry {
    pub fn new(gop_cache_max_frames: usize, max_players_per_path: usize) -> Self {
        Self {
            streams: HashMap::new(),
            gop_cache_max_frames,
            max_players_per_path,
        }
    }

    /// Fetch a path's record, creating it lazily.
    pub fn get_or_create(&mut self, path: &str) -> &mut StreamEntry {
        if !self.streams.contains_key(path) {
            tracing::info!(stream = %path, "stream created");
        }
        self.streams
            .entry(path.to_string())
            .or_insert_with(|| StreamEntry::new(path.to_string(), self.gop_cache_max_frames))
    }

    pub fn get(&self, path: &str) -> Option<&StreamEntry> {
        self.streams.get(path)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Attach a publisher; fails if the path already has one.
    pub fn attach_publisher(
        &mut self,
        path: &str,
        session: SessionHandle,
    ) -> Result<(), RegistryError> {
        let entry = self.get_or_create(path);

        if let Some(current) = entry.publisher_id() {
            if *current != session.id {
                return Err(RegistryError::PublisherOccupied(path.to_string()));
            }
        }

        tracing::info!(
            stream = %path,
            session_id = %session.id,
            players = entry.player_count(),
            "publisher attached"
        );
        entry.publisher = Some(session);
        Ok(())
    }

    /// Detach a publisher and drop the caches tied to its stream. Players
    /// are kept. A mismatched or missing publisher is a no-op.
    pub fn detach_publisher(&mut self, path: &str, session_id: &SessionId) {
        let Some(entry) = self.streams.get_mut(path) else {
            return;
        };

        match entry.publisher_id() {
            Some(current) if current == session_id => {
                entry.clear_publisher_state();
                tracing::info!(
                    stream = %path,
                    session_id = %session_id,
                    players = entry.player_count(),
                    "publisher detached"
                );
            }
            Some(current) => {
                tracing::warn!(
                    stream = %path,
                    expected = %current,
                    actual = %session_id,
                    "publisher detach mismatch, ignoring"
                );
            }
            None => {}
        }
    }

    /// Attach a player and send it the priming burst: cached metadata,
    /// AVC header, AAC header, then the GOP frames in arrival order.
    pub async fn attach_player(
        &mut self,
        path: &str,
        session: SessionHandle,
    ) -> Result<(), RegistryError> {
        let max_players = self.max_players_per_path;
        let entry = self.get_or_create(path);

        if entry.player_count() >= max_players {
            return Err(RegistryError::PlayerLimitReached(path.to_string()));
        }

        let mut primed = 0usize;
        if let Some(metadata) = &entry.metadata {
            if session.send(Outbound::Script(metadata.clone())).await.is_err() {
                tracing::debug!(stream = %path, session_id = %session.id, "player gone during priming");
                return Ok(());
            }
            primed += 1;
        }
        if let Some(header) = &entry.avc_header {
            if send_cached(&session, header).await.is_err() {
                return Ok(());
            }
            primed += 1;
        }
        if let Some(header) = &entry.aac_header {
            if send_cached(&session, header).await.is_err() {
                return Ok(());
            }
            primed += 1;
        }
        for frame in entry.gop.frames() {
            if send_cached(&session, frame).await.is_err() {
                return Ok(());
            }
            primed += 1;
        }

        tracing::info!(
            stream = %path,
            session_id = %session.id,
            players = entry.player_count() + 1,
            primed_frames = primed,
            "player attached"
        );
        entry.players.insert(session.id.clone(), session);
        Ok(())
    }

    /// Detach a player; unknown players are a no-op.
    pub fn detach_player(&mut self, path: &str, session_id: &SessionId) {
        if let Some(entry) = self.streams.get_mut(path) {
            if entry.players.remove(session_id).is_some() {
                tracing::info!(
                    stream = %path,
                    session_id = %session_id,
                    players = entry.player_count(),
                    "player detached"
                );
            }
        }
    }

    /// Audio from a publisher: cache AAC sequence headers, grow the GOP
    /// window, fan out.
    pub async fn on_audio(
        &mut self,
        session_id: &SessionId,
        path: &str,
        timestamp: u32,
        payload: Vec<Bytes>,
    ) {
        let Some(entry) = self.streams.get_mut(path) else {
            return;
        };
        if entry.publisher_id() != Some(session_id) {
            tracing::debug!(stream = %path, session_id = %session_id, "audio from non-publisher ignored");
            return;
        }

        if is_aac_sequence_header(&payload) {
            // Players get this at join time; no fan-out of the header
            // frame itself
            entry.aac_header = Some(CachedFrame::audio(timestamp, payload));
            tracing::debug!(stream = %path, "AAC sequence header cached");
            return;
        }

        entry.gop.push_audio(timestamp, payload.clone());

        for player in entry.players.values() {
            let delivered = player.try_send_media(Outbound::Audio {
                payload: payload.clone(),
                timestamp,
            });
            if !delivered {
                tracing::warn!(
                    stream = %path,
                    session_id = %player.id,
                    "player inbox full, audio frame dropped"
                );
            }
        }
    }

    /// Video from a publisher: cache AVC sequence headers, maintain the
    /// GOP window, fan out.
    pub async fn on_video(
        &mut self,
        session_id: &SessionId,
        path: &str,
        timestamp: u32,
        frame_class: FrameClass,
        payload: Vec<Bytes>,
    ) {
        let Some(entry) = self.streams.get_mut(path) else {
            return;
        };
        if entry.publisher_id() != Some(session_id) {
            tracing::debug!(stream = %path, session_id = %session_id, "video from non-publisher ignored");
            return;
        }

        if is_avc_sequence_header(&payload) {
            entry.avc_header = Some(CachedFrame::video(frame_class, timestamp, payload.clone()));
            tracing::debug!(stream = %path, "AVC sequence header cached");

            // Decoder reconfiguration mid-stream must reach every player
            for player in entry.players.values() {
                let _ = player
                    .send(Outbound::Video {
                        payload: payload.clone(),
                        timestamp,
                    })
                    .await;
            }
            return;
        }

        entry.gop.push_video(frame_class, timestamp, payload.clone());

        for player in entry.players.values() {
            let delivered = player.try_send_media(Outbound::Video {
                payload: payload.clone(),
                timestamp,
            });
            if !delivered {
                tracing::warn!(
                    stream = %path,
                    session_id = %player.id,
                    "player inbox full, video frame dropped"
                );
            }
        }
    }

    /// Metadata from a publisher: re-encode once, replace the cache, fan
    /// out to every player without dropping.
    pub async fn on_metadata(
        &mut self,
        session_id: &SessionId,
        path: &str,
        metadata: HashMap<String, AmfValue>,
    ) {
        let Some(entry) = self.streams.get_mut(path) else {
            return;
        };
        if entry.publisher_id() != Some(session_id) {
            tracing::debug!(stream = %path, session_id = %session_id, "metadata from non-publisher ignored");
            return;
        }

        let payload = amf::encode_sequence(&[
            AmfValue::String("onMetaData".into()),
            AmfValue::Object(metadata),
        ]);
        entry.metadata = Some(payload.clone());
        tracing::debug!(stream = %path, "metadata cached");

        for player in entry.players.values() {
            let _ = player.send(Outbound::Script(payload.clone())).await;
        }
    }

    /// Drop a path once nothing references it: no publisher, no players,
    /// no cached data.
    pub fn remove_if_idle(&mut self, path: &str) {
        if self.streams.get(path).is_some_and(StreamEntry::is_idle) {
            self.streams.remove(path);
            tracing::info!(stream = %path, "idle stream removed");
        }
    }

    /// Remove a session from every path it touches, publisher or player,
    /// and drop paths that became idle. Safe to call for sessions that
    /// never attached anywhere.
    pub fn detach_session(&mut self, session_id: &SessionId) {
        let paths: Vec<String> = self.streams.keys().cloned().collect();
        for path in paths {
            if let Some(entry) = self.streams.get_mut(&path) {
                if entry.publisher_id() == Some(session_id) {
                    entry.clear_publisher_state();
                    tracing::info!(stream = %path, session_id = %session_id, "publisher detached on close");
                }
                entry.players.remove(session_id);
            }
            self.remove_if_idle(&path);
        }
    }

    /// Drop every record (server shutdown).
    pub fn clear(&mut self) {
        self.streams.clear();
    }
}

async fn send_cached(session: &SessionHandle, frame: &CachedFrame) -> crate::error::Result<()> {
    let item = match frame.kind {
        FrameKind::Video => Outbound::Video {
            payload: frame.payload.clone(),
            timestamp: frame.timestamp,
        },
        FrameKind::Audio => Outbound::Audio {
            payload: frame.payload.clone(),
            timestamp: frame.timestamp,
        },
    };
    session.send(item).await
}
