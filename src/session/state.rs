//! Per-session identity, role, and bookkeeping

use std::time::Instant;

use rand::Rng;

/// Stable opaque session identity.
///
/// A 64-bit random rendered as hex; the registry and the server address a
/// session only through this key, never through a direct reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let raw: u64 = rand::thread_rng().gen();
        Self(format!("{raw:016x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the peer is doing on this connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Connected but neither publishing nor playing
    Idle,
    /// Pushing media into a path
    Publishing,
    /// Receiving a path's fan-out
    Playing,
}

/// Counters reported when the session closes
#[derive(Debug)]
pub struct SessionStats {
    pub audio_frames: u64,
    pub video_frames: u64,
    pub keyframes: u64,
    pub bytes_received: u64,
    pub started_at: Instant,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            audio_frames: 0,
            video_frames: 0,
            keyframes: 0,
            bytes_received: 0,
            started_at: Instant::now(),
        }
    }

    pub fn on_audio(&mut self, size: usize) {
        self.audio_frames += 1;
        self.bytes_received += size as u64;
    }

    pub fn on_video(&mut self, size: usize, is_keyframe: bool) {
        self.video_frames += 1;
        self.bytes_received += size as u64;
        if is_keyframe {
            self.keyframes += 1;
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_format() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), 16);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_session_ids_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_stats_counting() {
        let mut stats = SessionStats::new();
        stats.on_video(500, true);
        stats.on_video(200, false);
        stats.on_audio(100);

        assert_eq!(stats.video_frames, 2);
        assert_eq!(stats.keyframes, 1);
        assert_eq!(stats.audio_frames, 1);
        assert_eq!(stats.bytes_received, 800);
    }
}
