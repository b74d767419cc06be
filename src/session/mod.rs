//! Connection session
//!
//! One `Session` per accepted connection. The reader task drives the
//! handshake and then a read/route loop; a companion writer task (see
//! [`outbox`]) owns the write half so command replies and registry
//! fan-out never interleave. Sessions talk to the rest of the server
//! exclusively through [`SessionEvent`]s.

pub mod commands;
pub mod media;
pub mod outbox;
pub mod state;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

use crate::error::{Error, ProtocolError, Result};
use crate::events::SessionEvent;
use crate::protocol::constants::{
    MAX_CHUNK_SIZE, MSG_TYPE_ABORT, MSG_TYPE_ACKNOWLEDGEMENT, MSG_TYPE_AMF0_COMMAND,
    MSG_TYPE_AMF0_DATA, MSG_TYPE_AMF0_SHARED_OBJECT, MSG_TYPE_AMF3_COMMAND, MSG_TYPE_AMF3_DATA,
    MSG_TYPE_AMF3_SHARED_OBJECT, MSG_TYPE_AUDIO, MSG_TYPE_SET_CHUNK_SIZE, MSG_TYPE_SET_PEER_BW,
    MSG_TYPE_USER_CONTROL, MSG_TYPE_VIDEO, MSG_TYPE_WINDOW_ACK_SIZE,
};
use crate::protocol::{handshake, Message, MessageReader};

pub use outbox::{Outbound, SessionHandle};
pub use state::{SessionId, SessionRole, SessionStats};

use outbox::OUTBOUND_QUEUE_CAPACITY;

/// Per-session knobs handed down from the server config
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Chunk size announced (and adopted inbound) after `connect`
    pub outbound_chunk_size: u32,
    /// Idle transports are closed after this long without a message
    pub idle_timeout: Duration,
}

/// State owned by one connection's reader task
pub struct Session {
    id: SessionId,
    peer_addr: SocketAddr,
    reader: MessageReader,
    outbound: mpsc::Sender<Outbound>,
    events: mpsc::Sender<SessionEvent>,

    pub(crate) app_name: Option<String>,
    pub(crate) stream_name: Option<String>,
    pub(crate) role: SessionRole,
    pub(crate) stream_id: u32,
    pub(crate) stats: SessionStats,

    outbound_chunk_size: u32,
    idle_timeout: Duration,
}

impl Session {
    /// Create a session for an accepted connection and start its reader
    /// task. The returned handle is the only way to reach the session.
    pub fn spawn(
        socket: TcpStream,
        peer_addr: SocketAddr,
        settings: SessionSettings,
        events: mpsc::Sender<SessionEvent>,
        shutdown: broadcast::Receiver<()>,
    ) -> SessionHandle {
        let id = SessionId::generate();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let handle = SessionHandle::new(id.clone(), outbound_tx.clone());

        let session = Session {
            id,
            peer_addr,
            reader: MessageReader::new(),
            outbound: outbound_tx,
            events,
            app_name: None,
            stream_name: None,
            role: SessionRole::Idle,
            stream_id: 0,
            stats: SessionStats::new(),
            outbound_chunk_size: settings.outbound_chunk_size,
            idle_timeout: settings.idle_timeout,
        };

        tokio::spawn(session.run(socket, outbound_rx, shutdown));
        handle
    }

    async fn run(
        mut self,
        mut socket: TcpStream,
        outbound_rx: mpsc::Receiver<Outbound>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::debug!(session_id = %self.id, peer = %self.peer_addr, "session started");

        match tokio::time::timeout(self.idle_timeout, handshake::accept(&mut socket)).await {
            Ok(Ok(())) => {
                tracing::debug!(session_id = %self.id, peer = %self.peer_addr, "handshake complete");
            }
            Ok(Err(e)) => {
                tracing::info!(session_id = %self.id, error = %e, "handshake failed");
                self.finish().await;
                return;
            }
            Err(_) => {
                tracing::info!(session_id = %self.id, "handshake timed out");
                self.finish().await;
                return;
            }
        }

        let (mut read_half, write_half) = socket.into_split();
        let _writer = outbox::spawn_writer(write_half, outbound_rx, self.id.clone());

        loop {
            let message = tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!(session_id = %self.id, "shutdown signal");
                    break;
                }
                result = tokio::time::timeout(
                    self.idle_timeout,
                    self.reader.read_message(&mut read_half),
                ) => match result {
                    Err(_) => {
                        tracing::info!(session_id = %self.id, "idle timeout, closing");
                        break;
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(session_id = %self.id, error = %e, "read loop ended");
                        break;
                    }
                    Ok(Ok(message)) => message,
                },
            };

            if let Err(e) = self.handle_message(message).await {
                if e.is_fatal() {
                    tracing::warn!(session_id = %self.id, error = %e, "closing session");
                    break;
                }
                tracing::warn!(session_id = %self.id, error = %e, "message error");
            }
        }

        self.finish().await;
    }

    /// Dispatch one reassembled message by type id.
    async fn handle_message(&mut self, message: Message) -> Result<()> {
        match message.header.type_id {
            MSG_TYPE_SET_CHUNK_SIZE => self.handle_set_chunk_size(&message),
            MSG_TYPE_ABORT => self.handle_abort(&message),
            MSG_TYPE_ACKNOWLEDGEMENT | MSG_TYPE_WINDOW_ACK_SIZE | MSG_TYPE_SET_PEER_BW => {
                // Acknowledgement windows are not enforced in this profile
                tracing::trace!(session_id = %self.id, type_id = message.header.type_id, "control message ignored");
                Ok(())
            }
            MSG_TYPE_USER_CONTROL => {
                tracing::trace!(session_id = %self.id, "user control ignored");
                Ok(())
            }
            MSG_TYPE_AUDIO => self.handle_audio(message).await,
            MSG_TYPE_VIDEO => self.handle_video(message).await,
            MSG_TYPE_AMF3_DATA | MSG_TYPE_AMF3_SHARED_OBJECT | MSG_TYPE_AMF3_COMMAND => {
                tracing::debug!(session_id = %self.id, type_id = message.header.type_id, "AMF3 message unsupported");
                Ok(())
            }
            MSG_TYPE_AMF0_DATA => self.handle_script_data(message).await,
            MSG_TYPE_AMF0_SHARED_OBJECT => {
                tracing::debug!(session_id = %self.id, "shared object message ignored");
                Ok(())
            }
            MSG_TYPE_AMF0_COMMAND => self.handle_command(message).await,
            other => {
                tracing::warn!(session_id = %self.id, type_id = other, "unhandled message type");
                Ok(())
            }
        }
    }

    fn handle_set_chunk_size(&mut self, message: &Message) -> Result<()> {
        let payload = message.payload_bytes();
        if payload.len() != 4 {
            return Err(ProtocolError::InvalidSetChunkSizePayload(payload.len()).into());
        }

        let value = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        if value & 0x8000_0000 != 0 {
            return Err(ProtocolError::ReservedBitSet(value).into());
        }
        if value == 0 || value > MAX_CHUNK_SIZE {
            return Err(ProtocolError::ChunkSizeOutOfRange(value).into());
        }

        tracing::debug!(session_id = %self.id, size = value, "inbound chunk size updated");
        self.reader.set_chunk_size(value);
        Ok(())
    }

    fn handle_abort(&mut self, message: &Message) -> Result<()> {
        let payload = message.payload_bytes();
        if payload.len() != 4 {
            return Err(ProtocolError::InvalidAbortPayload(payload.len()).into());
        }

        let csid = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        if csid < 2 {
            return Err(ProtocolError::InvalidChunkStreamId(csid).into());
        }

        tracing::debug!(session_id = %self.id, csid = csid, "abort, dropping partial message");
        self.reader.abort(csid);
        Ok(())
    }

    /// `app + "/" + streamName`, available once both are known.
    pub(crate) fn full_path(&self) -> Option<String> {
        match (&self.app_name, &self.stream_name) {
            (Some(app), Some(name)) => Some(format!("{app}/{name}")),
            _ => None,
        }
    }

    pub(crate) async fn emit(&self, event: SessionEvent) -> Result<()> {
        self.events.send(event).await.map_err(|_| Error::EventBusClosed)
    }

    pub(crate) async fn send_outbound(&self, item: Outbound) -> Result<()> {
        self.outbound.send(item).await.map_err(|_| Error::OutboundClosed)
    }

    /// Emit the stop events the current role requires, announce the
    /// termination, and log the session's totals. Safe to reach from any
    /// exit path; stopping an idle session is a no-op.
    async fn finish(&mut self) {
        // The event loop may already be gone during shutdown
        let _ = self.stop_active_stream().await;

        let _ = self
            .events
            .send(SessionEvent::SessionTerminated {
                session_id: self.id.clone(),
            })
            .await;

        tracing::info!(
            session_id = %self.id,
            peer = %self.peer_addr,
            duration_secs = self.stats.started_at.elapsed().as_secs(),
            video_frames = self.stats.video_frames,
            audio_frames = self.stats.audio_frames,
            keyframes = self.stats.keyframes,
            bytes_received = self.stats.bytes_received,
            "session closed"
        );
    }
}
