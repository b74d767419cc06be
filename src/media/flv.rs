//! FLV tag-header classification
//!
//! RTMP audio/video message bodies are FLV tag bodies. The first byte (or
//! two) say everything the relay needs: frame class, codec, and whether a
//! payload is a decoder-config sequence header.
//!
//! ```text
//! Video: | FrameType (4 bits) | CodecID (4 bits) | [AVCPacketType (1 byte)] ...
//! Audio: | SoundFormat (4 bits) | Rate (2) | Size (1) | Type (1) | [AACPacketType] ...
//! ```

use bytes::Bytes;

/// Video frame class (upper 4 bits of the first payload byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Keyframe (seekable)
    Keyframe = 1,
    /// Inter frame
    Inter = 2,
    /// Disposable inter frame
    DisposableInter = 3,
    /// Generated keyframe (server use)
    GeneratedKeyframe = 4,
    /// Video info/command frame
    Command = 5,
}

impl FrameClass {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            1 => Some(FrameClass::Keyframe),
            2 => Some(FrameClass::Inter),
            3 => Some(FrameClass::DisposableInter),
            4 => Some(FrameClass::GeneratedKeyframe),
            5 => Some(FrameClass::Command),
            _ => None,
        }
    }

    /// Keyframes start a new GOP; generated keyframes count.
    pub fn is_keyframe(&self) -> bool {
        matches!(self, FrameClass::Keyframe | FrameClass::GeneratedKeyframe)
    }

    /// Frames eligible for the GOP buffer after a keyframe.
    pub fn is_inter(&self) -> bool {
        matches!(self, FrameClass::Inter | FrameClass::DisposableInter)
    }
}

impl std::fmt::Display for FrameClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FrameClass::Keyframe => "key frame",
            FrameClass::Inter => "inter frame",
            FrameClass::DisposableInter => "disposable inter frame",
            FrameClass::GeneratedKeyframe => "generated key frame",
            FrameClass::Command => "video info/command frame",
        };
        f.write_str(s)
    }
}

/// Video codec id (lower 4 bits of the first payload byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    SorensonH263 = 2,
    ScreenVideo = 3,
    Vp6 = 4,
    Vp6Alpha = 5,
    ScreenVideoV2 = 6,
    /// AVC (H.264)
    Avc = 7,
}

impl VideoCodec {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            2 => Some(VideoCodec::SorensonH263),
            3 => Some(VideoCodec::ScreenVideo),
            4 => Some(VideoCodec::Vp6),
            5 => Some(VideoCodec::Vp6Alpha),
            6 => Some(VideoCodec::ScreenVideoV2),
            7 => Some(VideoCodec::Avc),
            _ => None,
        }
    }
}

/// AVC packet type (second payload byte when the codec is AVC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcPacketType {
    /// SPS/PPS decoder configuration
    SequenceHeader = 0,
    Nalu = 1,
    EndOfSequence = 2,
}

impl AvcPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AvcPacketType::SequenceHeader),
            1 => Some(AvcPacketType::Nalu),
            2 => Some(AvcPacketType::EndOfSequence),
            _ => None,
        }
    }
}

/// Audio codec id (upper 4 bits of the first payload byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    LinearPcmPlatform = 0,
    Adpcm = 1,
    Mp3 = 2,
    LinearPcmLe = 3,
    Nellymoser16kMono = 4,
    Nellymoser8kMono = 5,
    Nellymoser = 6,
    G711ALaw = 7,
    G711MuLaw = 8,
    Aac = 10,
    Speex = 11,
    Mp38k = 14,
    DeviceSpecific = 15,
}

impl AudioCodec {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            0 => Some(AudioCodec::LinearPcmPlatform),
            1 => Some(AudioCodec::Adpcm),
            2 => Some(AudioCodec::Mp3),
            3 => Some(AudioCodec::LinearPcmLe),
            4 => Some(AudioCodec::Nellymoser16kMono),
            5 => Some(AudioCodec::Nellymoser8kMono),
            6 => Some(AudioCodec::Nellymoser),
            7 => Some(AudioCodec::G711ALaw),
            8 => Some(AudioCodec::G711MuLaw),
            10 => Some(AudioCodec::Aac),
            11 => Some(AudioCodec::Speex),
            14 => Some(AudioCodec::Mp38k),
            15 => Some(AudioCodec::DeviceSpecific),
            _ => None,
        }
    }
}

/// AAC packet type (second payload byte when the codec is AAC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacPacketType {
    /// AudioSpecificConfig decoder configuration
    SequenceHeader = 0,
    Raw = 1,
}

impl AacPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AacPacketType::SequenceHeader),
            1 => Some(AacPacketType::Raw),
            _ => None,
        }
    }
}

/// Byte at a logical offset in a sliced payload.
pub fn payload_byte(payload: &[Bytes], mut index: usize) -> Option<u8> {
    for slice in payload {
        if index < slice.len() {
            return Some(slice[index]);
        }
        index -= slice.len();
    }
    None
}

/// True when the payload is an AVC sequence header (0x17 0x00 by RTMP
/// convention: keyframe + AVC codec, packet type 0).
pub fn is_avc_sequence_header(payload: &[Bytes]) -> bool {
    payload_byte(payload, 0) == Some(0x17) && payload_byte(payload, 1) == Some(0x00)
}

/// True when the payload is an AAC sequence header (AAC codec nibble,
/// packet type byte 0).
pub fn is_aac_sequence_header(payload: &[Bytes]) -> bool {
    payload_byte(payload, 0).map(AudioCodec::from_byte) == Some(Some(AudioCodec::Aac))
        && payload_byte(payload, 1) == Some(0x00)
}
