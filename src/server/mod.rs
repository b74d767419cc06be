//! RTMP server
//!
//! Binds the listener, accepts connections into sessions, and runs the
//! event loop that owns both the session-identity map and the stream
//! registry. Because every [`SessionEvent`] is dispatched serially here,
//! registry state needs no locking and per-path ordering follows event
//! order.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use crate::config::Config;
use crate::error::{RegistryError, Result};
use crate::events::SessionEvent;
use crate::protocol::constants::{STATUS_PLAY_FAILED, STATUS_PUBLISH_BAD_NAME};
use crate::registry::StreamRegistry;
use crate::session::commands::status_payload;
use crate::session::{Outbound, Session, SessionHandle, SessionId, SessionSettings};

/// Bound on the session-to-registry event queue
const EVENT_QUEUE_CAPACITY: usize = 128;

/// How long shutdown waits for sessions to drain before giving up
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Live ingest and fan-out server
pub struct RtmpServer {
    config: Config,
}

impl RtmpServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until the process is killed.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run until the shutdown future resolves, then drain gracefully:
    /// stop accepting, cancel every session, wait for them to drop out,
    /// clear the registry.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.rtmp.port));
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "RTMP server listening");

        let (event_tx, mut event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (cancel_tx, _) = broadcast::channel(1);

        let settings = SessionSettings {
            outbound_chunk_size: self.config.rtmp.outbound_chunk_size,
            idle_timeout: Duration::from_secs(self.config.session.idle_timeout_secs),
        };
        let accept_task = tokio::spawn(accept_loop(
            listener,
            event_tx,
            cancel_tx.clone(),
            settings,
        ));

        let mut sessions: HashMap<SessionId, SessionHandle> = HashMap::new();
        let mut registry = StreamRegistry::new(
            self.config.stream.gop_cache_max_frames,
            self.config.stream.max_players_per_path,
        );

        tokio::pin!(shutdown);
        let mut shutting_down = false;

        loop {
            tokio::select! {
                _ = &mut shutdown, if !shutting_down => {
                    tracing::info!("shutdown signal received");
                    shutting_down = true;
                    accept_task.abort();
                    let _ = cancel_tx.send(());
                }
                event = event_rx.recv() => match event {
                    Some(event) => dispatch(event, &mut sessions, &mut registry).await,
                    // Every sender gone: accept loop and all sessions done
                    None => break,
                },
                _ = tokio::time::sleep(SHUTDOWN_GRACE), if shutting_down => {
                    tracing::warn!(
                        remaining_sessions = sessions.len(),
                        "shutdown grace period elapsed"
                    );
                    break;
                }
            }

            if shutting_down && sessions.is_empty() {
                break;
            }
        }

        registry.clear();
        sessions.clear();
        while event_rx.try_recv().is_ok() {}

        tracing::info!("server stopped");
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    events: mpsc::Sender<SessionEvent>,
    cancel: broadcast::Sender<()>,
    settings: SessionSettings,
) {
    loop {
        match listener.accept().await {
            Ok((socket, peer_addr)) => {
                // Low latency matters more than throughput here
                if let Err(e) = socket.set_nodelay(true) {
                    tracing::debug!(peer = %peer_addr, error = %e, "failed to set TCP_NODELAY");
                }

                let handle = Session::spawn(
                    socket,
                    peer_addr,
                    settings,
                    events.clone(),
                    cancel.subscribe(),
                );

                let opened = SessionEvent::ConnectionOpened {
                    session: handle,
                    peer_addr,
                };
                if events.send(opened).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
            }
        }
    }
}

/// Apply one session event to the identity map and the registry.
async fn dispatch(
    event: SessionEvent,
    sessions: &mut HashMap<SessionId, SessionHandle>,
    registry: &mut StreamRegistry,
) {
    match event {
        SessionEvent::ConnectionOpened { session, peer_addr } => {
            tracing::info!(session_id = %session.id, peer = %peer_addr, "connection opened");
            sessions.insert(session.id.clone(), session);
        }

        SessionEvent::PublishStarted {
            session_id,
            path,
            stream_id,
        } => {
            tracing::info!(session_id = %session_id, path = %path, stream_id = stream_id, "publish started");
            let Some(handle) = sessions.get(&session_id) else {
                tracing::warn!(session_id = %session_id, "publisher session not found");
                return;
            };

            if let Err(RegistryError::PublisherOccupied(_)) =
                registry.attach_publisher(&path, handle.clone())
            {
                tracing::warn!(session_id = %session_id, path = %path, "publish rejected, path occupied");
                let status = status_payload(
                    "error",
                    STATUS_PUBLISH_BAD_NAME,
                    format!("Stream {path} is already being published"),
                    Some(&path),
                );
                let _ = handle.send(Outbound::Command(status)).await;
            }
        }

        SessionEvent::PublishStopped {
            session_id, path, ..
        } => {
            tracing::info!(session_id = %session_id, path = %path, "publish stopped");
            registry.detach_publisher(&path, &session_id);
            registry.remove_if_idle(&path);
        }

        SessionEvent::PlayStarted {
            session_id,
            path,
            stream_id,
        } => {
            tracing::info!(session_id = %session_id, path = %path, stream_id = stream_id, "play started");
            let Some(handle) = sessions.get(&session_id) else {
                tracing::warn!(session_id = %session_id, "player session not found");
                return;
            };

            if let Err(RegistryError::PlayerLimitReached(_)) =
                registry.attach_player(&path, handle.clone()).await
            {
                tracing::warn!(session_id = %session_id, path = %path, "play rejected, player limit reached");
                let status = status_payload(
                    "error",
                    STATUS_PLAY_FAILED,
                    format!("Stream {path} has reached its player limit"),
                    Some(&path),
                );
                let _ = handle.send(Outbound::Command(status)).await;
            }
        }

        SessionEvent::PlayStopped {
            session_id, path, ..
        } => {
            tracing::info!(session_id = %session_id, path = %path, "play stopped");
            registry.detach_player(&path, &session_id);
            registry.remove_if_idle(&path);
        }

        SessionEvent::AudioData {
            session_id,
            path,
            timestamp,
            payload,
        } => {
            registry
                .on_audio(&session_id, &path, timestamp, payload)
                .await;
        }

        SessionEvent::VideoData {
            session_id,
            path,
            timestamp,
            frame_class,
            payload,
        } => {
            registry
                .on_video(&session_id, &path, timestamp, frame_class, payload)
                .await;
        }

        SessionEvent::Metadata {
            session_id,
            path,
            metadata,
        } => {
            registry.on_metadata(&session_id, &path, metadata).await;
        }

        SessionEvent::SessionTerminated { session_id } => {
            tracing::info!(session_id = %session_id, "session terminated");
            sessions.remove(&session_id);
            registry.detach_session(&session_id);
        }
    }
}
