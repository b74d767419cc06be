//! Media payload classification and the GOP priming buffer

pub mod flv;
pub mod gop;

pub use flv::{AacPacketType, AudioCodec, AvcPacketType, FrameClass, VideoCodec};
pub use gop::{CachedFrame, FrameKind, GopBuffer};
