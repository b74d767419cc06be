//! Session outbound side
//!
//! All writes to a session's transport (its own command replies and the
//! frames the registry fans in) flow through one bounded inbox consumed
//! by a single writer task. That task is the only holder of the write
//! half, which keeps concurrent writes from interleaving mid-message.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::protocol::writer::MessageWriter;
use crate::session::state::SessionId;

/// Bound on a session's outbound inbox. Live media beyond this is dropped
/// for that player rather than stalling the registry.
pub(crate) const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// One item queued for a session's transport
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Raise the outbound chunk size; the writer adopts it after sending
    SetChunkSize(u32),
    /// Pre-encoded AMF0 command or status body
    Command(Bytes),
    /// Audio frame for a player
    Audio { payload: Vec<Bytes>, timestamp: u32 },
    /// Video frame for a player
    Video { payload: Vec<Bytes>, timestamp: u32 },
    /// Pre-encoded AMF0 script body (onMetaData)
    Script(Bytes),
}

/// Cloneable address of a session: its identity plus its inbox.
///
/// The registry and the server hold these instead of session references;
/// dropping the last handle (plus the session's own sender) ends the
/// writer task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    outbound: mpsc::Sender<Outbound>,
}

impl SessionHandle {
    pub(crate) fn new(id: SessionId, outbound: mpsc::Sender<Outbound>) -> Self {
        Self { id, outbound }
    }

    /// Enqueue an item that must not be dropped (replies, status, sequence
    /// headers, metadata, priming frames). Awaits inbox room.
    pub async fn send(&self, item: Outbound) -> Result<()> {
        self.outbound
            .send(item)
            .await
            .map_err(|_| Error::OutboundClosed)
    }

    /// Enqueue a live media frame; on a full or closed inbox the frame is
    /// dropped for this player and `false` returned.
    pub fn try_send_media(&self, item: Outbound) -> bool {
        self.outbound.try_send(item).is_ok()
    }
}

/// Spawn the writer task owning the transport's write half.
///
/// Exits when every inbox sender is gone or a write fails, then shuts the
/// write half down.
pub(crate) fn spawn_writer<W>(
    mut write_half: W,
    mut inbox: mpsc::Receiver<Outbound>,
    session_id: SessionId,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut writer = MessageWriter::new();

        while let Some(item) = inbox.recv().await {
            let result = match item {
                Outbound::SetChunkSize(size) => writer.write_set_chunk_size(&mut write_half, size).await,
                Outbound::Command(payload) => writer.write_command(&mut write_half, payload).await,
                Outbound::Audio { payload, timestamp } => {
                    writer.write_audio(&mut write_half, payload, timestamp).await
                }
                Outbound::Video { payload, timestamp } => {
                    writer.write_video(&mut write_half, payload, timestamp).await
                }
                Outbound::Script(payload) => writer.write_script(&mut write_half, payload).await,
            };

            if let Err(e) = result {
                tracing::debug!(session_id = %session_id, error = %e, "outbound write failed");
                break;
            }
        }

        let _ = write_half.shutdown().await;
        tracing::debug!(session_id = %session_id, "writer task finished");
    })
}
