//! GOP buffer for late-joiner priming
//!
//! A new player needs the decoder configs plus every frame since the last
//! keyframe before live frames make sense. The registry keeps that window
//! here: a keyframe starts a fresh buffer, inter and audio frames append
//! behind it in arrival order.
//!
//! Invariant: the oldest retained entry is a video keyframe, or the buffer
//! is empty. On hitting the frame bound the buffer is cleared and refills
//! at the next keyframe; dropping the leading keyframe instead would leave
//! a tail no decoder could start on.

use std::collections::VecDeque;

use bytes::Bytes;

use super::flv::FrameClass;

/// Kind of cached frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Video,
    Audio,
}

/// One buffered media frame
#[derive(Debug, Clone)]
pub struct CachedFrame {
    pub kind: FrameKind,
    /// Video frame class; audio frames carry `None`
    pub frame_class: Option<FrameClass>,
    /// Timestamp recorded at cache time; players see these as-is
    pub timestamp: u32,
    pub payload: Vec<Bytes>,
}

impl CachedFrame {
    pub fn video(frame_class: FrameClass, timestamp: u32, payload: Vec<Bytes>) -> Self {
        Self {
            kind: FrameKind::Video,
            frame_class: Some(frame_class),
            timestamp,
            payload,
        }
    }

    pub fn audio(timestamp: u32, payload: Vec<Bytes>) -> Self {
        Self {
            kind: FrameKind::Audio,
            frame_class: None,
            timestamp,
            payload,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        self.kind == FrameKind::Video && self.frame_class.is_some_and(|c| c.is_keyframe())
    }
}

/// Bounded frame buffer from the latest keyframe forward
#[derive(Debug)]
pub struct GopBuffer {
    max_frames: usize,
    frames: VecDeque<CachedFrame>,
}

impl GopBuffer {
    pub fn new(max_frames: usize) -> Self {
        Self {
            max_frames,
            frames: VecDeque::new(),
        }
    }

    /// Feed a video frame. Keyframes start a new GOP; inter frames append
    /// only while a keyframe anchors the buffer.
    pub fn push_video(&mut self, frame_class: FrameClass, timestamp: u32, payload: Vec<Bytes>) {
        if frame_class.is_keyframe() {
            self.frames.clear();
            self.frames
                .push_back(CachedFrame::video(frame_class, timestamp, payload));
            return;
        }

        if frame_class.is_inter() && !self.frames.is_empty() {
            self.push_bounded(CachedFrame::video(frame_class, timestamp, payload));
        }
    }

    /// Feed an audio frame; appended only while a keyframe anchors the
    /// buffer. Sequence headers are cached separately and must not land
    /// here.
    pub fn push_audio(&mut self, timestamp: u32, payload: Vec<Bytes>) {
        if !self.frames.is_empty() {
            self.push_bounded(CachedFrame::audio(timestamp, payload));
        }
    }

    fn push_bounded(&mut self, frame: CachedFrame) {
        if self.frames.len() >= self.max_frames {
            tracing::debug!(
                max_frames = self.max_frames,
                "GOP buffer full, clearing until next keyframe"
            );
            self.frames.clear();
            return;
        }
        self.frames.push_back(frame);
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames in arrival order, keyframe first.
    pub fn frames(&self) -> impl Iterator<Item = &CachedFrame> {
        self.frames.iter()
    }

    /// Total payload bytes currently held
    pub fn size_bytes(&self) -> usize {
        self.frames
            .iter()
            .map(|f| f.payload.iter().map(Bytes::len).sum::<usize>())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_payload(first_byte: u8) -> Vec<Bytes> {
        vec![Bytes::copy_from_slice(&[first_byte, 0x01, 0xAA])]
    }

    fn keyframe(ts: u32) -> (FrameClass, u32, Vec<Bytes>) {
        (FrameClass::Keyframe, ts, video_payload(0x17))
    }

    fn inter(ts: u32) -> (FrameClass, u32, Vec<Bytes>) {
        (FrameClass::Inter, ts, video_payload(0x27))
    }

    fn assert_invariant(buf: &GopBuffer) {
        if let Some(first) = buf.frames().next() {
            assert!(first.is_keyframe(), "oldest entry must be a keyframe");
        }
        assert!(buf.len() <= buf.max_frames);
    }

    #[test]
    fn test_keyframe_starts_gop() {
        let mut buf = GopBuffer::new(10);

        // Inter frames before any keyframe are not cached
        let (c, ts, p) = inter(0);
        buf.push_video(c, ts, p);
        assert!(buf.is_empty());

        let (c, ts, p) = keyframe(40);
        buf.push_video(c, ts, p);
        assert_eq!(buf.len(), 1);
        assert_invariant(&buf);
    }

    #[test]
    fn test_keyframe_clears_previous_gop() {
        let mut buf = GopBuffer::new(10);

        let (c, ts, p) = keyframe(0);
        buf.push_video(c, ts, p);
        let (c, ts, p) = inter(40);
        buf.push_video(c, ts, p);
        let (c, ts, p) = inter(80);
        buf.push_video(c, ts, p);
        assert_eq!(buf.len(), 3);

        let (c, ts, p) = keyframe(120);
        buf.push_video(c, ts, p);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.frames().next().unwrap().timestamp, 120);
        assert_invariant(&buf);
    }

    #[test]
    fn test_audio_appends_behind_keyframe() {
        let mut buf = GopBuffer::new(10);

        // Audio before a keyframe is not cached
        buf.push_audio(10, vec![Bytes::from_static(&[0xAF, 0x01])]);
        assert!(buf.is_empty());

        let (c, ts, p) = keyframe(40);
        buf.push_video(c, ts, p);
        buf.push_audio(40, vec![Bytes::from_static(&[0xAF, 0x01])]);

        assert_eq!(buf.len(), 2);
        let kinds: Vec<_> = buf.frames().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FrameKind::Video, FrameKind::Audio]);
        assert_invariant(&buf);
    }

    #[test]
    fn test_arrival_order_preserved() {
        // Matches the priming scenario: key(40), inter(80), audio(40)
        let mut buf = GopBuffer::new(10);
        let (c, ts, p) = keyframe(40);
        buf.push_video(c, ts, p);
        let (c, ts, p) = inter(80);
        buf.push_video(c, ts, p);
        buf.push_audio(40, vec![Bytes::from_static(&[0xAF, 0x01])]);

        let timestamps: Vec<_> = buf.frames().map(|f| f.timestamp).collect();
        assert_eq!(timestamps, vec![40, 80, 40]);
    }

    #[test]
    fn test_overflow_clears_until_next_keyframe() {
        let mut buf = GopBuffer::new(3);

        let (c, ts, p) = keyframe(0);
        buf.push_video(c, ts, p);
        for i in 1..3 {
            let (c, ts, p) = inter(i * 40);
            buf.push_video(c, ts, p);
        }
        assert_eq!(buf.len(), 3);

        // One past the bound: buffer resets, the overflowing inter frame
        // is not retained without its keyframe
        let (c, ts, p) = inter(120);
        buf.push_video(c, ts, p);
        assert!(buf.is_empty());
        assert_invariant(&buf);

        // Next keyframe re-anchors
        let (c, ts, p) = keyframe(160);
        buf.push_video(c, ts, p);
        assert_eq!(buf.len(), 1);
        assert_invariant(&buf);
    }

    #[test]
    fn test_disposable_inter_cached() {
        let mut buf = GopBuffer::new(10);
        let (c, ts, p) = keyframe(0);
        buf.push_video(c, ts, p);
        buf.push_video(FrameClass::DisposableInter, 40, video_payload(0x37));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_command_frames_not_cached() {
        let mut buf = GopBuffer::new(10);
        let (c, ts, p) = keyframe(0);
        buf.push_video(c, ts, p);
        buf.push_video(FrameClass::Command, 40, video_payload(0x57));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_generated_keyframe_anchors() {
        let mut buf = GopBuffer::new(10);
        buf.push_video(FrameClass::GeneratedKeyframe, 0, video_payload(0x47));
        assert_eq!(buf.len(), 1);
        assert_invariant(&buf);
    }

    #[test]
    fn test_clear() {
        let mut buf = GopBuffer::new(10);
        let (c, ts, p) = keyframe(0);
        buf.push_video(c, ts, p);
        buf.clear();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_size_bytes() {
        let mut buf = GopBuffer::new(10);
        let (c, ts, p) = keyframe(0);
        buf.push_video(c, ts, p);
        assert_eq!(buf.size_bytes(), 3);
    }
}
