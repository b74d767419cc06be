//! Crate error types
//!
//! Errors are grouped by the layer that produces them. Transport,
//! protocol, and AMF errors are fatal for the session that hit them.
//! [`RegistryError`] stays out of the top-level [`Error`]: the server
//! event loop handles it inline and answers the peer with an `onStatus`.

use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("AMF error: {0}")]
    Amf(#[from] AmfError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Transport read/write failure or peer close
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The session's outbound writer task is gone
    #[error("session outbound channel closed")]
    OutboundClosed,

    /// The server event loop is gone
    #[error("event bus closed")]
    EventBusClosed,

    /// A state violation the policy says to close on (e.g. a second
    /// `connect` on one session)
    #[error("state violation: {0}")]
    State(String),
}

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Handshake failures (fatal for the connection)
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("unsupported RTMP version: {0}")]
    UnsupportedVersion(u8),
}

/// Chunk-layer protocol violations (fatal for the session)
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// csid 0 and 1 are encoding indirections, never addresses
    #[error("invalid chunk stream id: {0}")]
    InvalidChunkStreamId(u32),

    /// fmt 1-3 chunk arrived on a csid with no prior full header
    #[error("chunk stream {0} has no prior message header to inherit")]
    NoPriorHeader(u32),

    #[error("Set Chunk Size payload must be 4 bytes, got {0}")]
    InvalidSetChunkSizePayload(usize),

    #[error("Set Chunk Size has reserved high bit set: {0:#010x}")]
    ReservedBitSet(u32),

    #[error("chunk size {0} outside valid range 1..=16777215")]
    ChunkSizeOutOfRange(u32),

    #[error("Abort payload must be 4 bytes, got {0}")]
    InvalidAbortPayload(usize),
}

/// AMF0 encode/decode failures
#[derive(Debug, Error)]
pub enum AmfError {
    #[error("unexpected end of AMF data")]
    UnexpectedEof,

    #[error("unknown AMF0 marker: {0:#04x}")]
    UnknownMarker(u8),

    #[error("missing object end marker")]
    InvalidObjectEnd,

    #[error("AMF structure nested too deeply")]
    NestingTooDeep,

    #[error("invalid UTF-8 in AMF string")]
    InvalidUtf8,
}

/// Stream registry failures (recoverable; surfaced to the peer as onStatus)
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("stream {0} already has a publisher")]
    PublisherOccupied(String),

    #[error("stream {0} reached its player limit")]
    PlayerLimitReached(String),
}

/// Configuration load/validation failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Error {
    /// Whether this error should terminate the session that produced it.
    ///
    /// Truncated AMF inside a command is a protocol violation per the
    /// error taxonomy, so AMF errors close the session too.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Handshake(_)
                | Error::Protocol(_)
                | Error::Amf(_)
                | Error::Transport(_)
                | Error::OutboundClosed
                | Error::EventBusClosed
                | Error::State(_)
        )
    }
}
