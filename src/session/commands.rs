//! AMF0 command surface
//!
//! Every command shares the same shape: name, transaction id, command
//! object (or null), then command-specific arguments. Handlers mutate the
//! session state machine, reply over the outbox, and emit registry events
//! for the media path lifecycle.

use std::collections::HashMap;

use bytes::Bytes;

use crate::amf::{self, AmfValue};
use crate::error::{Error, Result};
use crate::events::SessionEvent;
use crate::protocol::constants::{
    STATUS_CONNECT_SUCCESS, STATUS_PLAY_RESET, STATUS_PLAY_START, STATUS_PUBLISH_START,
    STATUS_UNPUBLISH_SUCCESS,
};
use crate::protocol::Message;
use crate::session::outbox::Outbound;
use crate::session::state::SessionRole;
use crate::session::Session;

/// Encode a `_result` reply.
pub fn result_payload(transaction_id: f64, properties: AmfValue, information: AmfValue) -> Bytes {
    amf::encode_sequence(&[
        AmfValue::String("_result".into()),
        AmfValue::Number(transaction_id),
        properties,
        information,
    ])
}

/// Encode a server-initiated `onStatus` notification (transaction id 0).
pub fn status_payload(level: &str, code: &str, description: String, details: Option<&str>) -> Bytes {
    let mut obj = HashMap::new();
    obj.insert("level".to_string(), AmfValue::String(level.into()));
    obj.insert("code".to_string(), AmfValue::String(code.into()));
    obj.insert("description".to_string(), AmfValue::String(description));
    if let Some(details) = details {
        obj.insert("details".to_string(), AmfValue::String(details.into()));
    }

    amf::encode_sequence(&[
        AmfValue::String("onStatus".into()),
        AmfValue::Number(0.0),
        AmfValue::Null,
        AmfValue::Object(obj),
    ])
}

/// Encode an `onFCPublish` / `onFCUnpublish` notification.
fn notify_payload(name: &str, code: &str, description: String) -> Bytes {
    let mut obj = HashMap::new();
    obj.insert("code".to_string(), AmfValue::String(code.into()));
    obj.insert("description".to_string(), AmfValue::String(description));

    amf::encode_sequence(&[
        AmfValue::String(name.into()),
        AmfValue::Number(0.0),
        AmfValue::Null,
        AmfValue::Object(obj),
    ])
}

fn number_at(values: &[AmfValue], index: usize) -> Option<f64> {
    values.get(index)?.as_number()
}

fn string_at(values: &[AmfValue], index: usize) -> Option<&str> {
    values.get(index)?.as_str()
}

impl Session {
    /// Decode an AMF0 command message and dispatch by name.
    pub(super) async fn handle_command(&mut self, message: Message) -> Result<()> {
        let mut body = message.payload_bytes();
        let values = amf::decode_sequence(&mut body)?;

        let Some(name) = values.first().and_then(AmfValue::as_str) else {
            tracing::warn!(session_id = %self.id, "command without a name, dropping");
            return Ok(());
        };
        let name = name.to_string();

        tracing::debug!(session_id = %self.id, command = %name, "handling command");

        match name.as_str() {
            "connect" => self.handle_connect(&values).await,
            "createStream" => self.handle_create_stream(&values).await,
            "publish" => self.handle_publish(&values).await,
            "play" => self.handle_play(&values).await,
            "pause" => self.handle_pause(&values),
            "deleteStream" => self.handle_delete_stream(&values).await,
            "closeStream" => self.handle_close_stream().await,
            "releaseStream" => self.handle_release_stream(&values).await,
            "FCPublish" => self.handle_fc_publish(&values).await,
            "FCUnpublish" => self.handle_fc_unpublish(&values).await,
            "receiveAudio" | "receiveVideo" | "onBWDone" => {
                tracing::debug!(session_id = %self.id, command = %name, "command acknowledged, no-op");
                Ok(())
            }
            other => {
                tracing::warn!(session_id = %self.id, command = %other, "unknown command");
                Ok(())
            }
        }
    }

    async fn handle_connect(&mut self, values: &[AmfValue]) -> Result<()> {
        if self.app_name.is_some() {
            return Err(Error::State("connect received twice".into()));
        }

        let Some(transaction_id) = number_at(values, 1) else {
            tracing::warn!(session_id = %self.id, "connect without transaction id, dropping");
            return Ok(());
        };

        match values.get(2).and_then(|v| v.get_string("app")) {
            Some(app) => {
                tracing::info!(session_id = %self.id, app = %app, "connect");
                self.app_name = Some(app.to_string());
            }
            None => {
                tracing::warn!(session_id = %self.id, "connect without app name");
            }
        }

        // Raise the chunk size before replying; many publishers wait for
        // the server to move first. The inbound side adopts the same size.
        self.send_outbound(Outbound::SetChunkSize(self.outbound_chunk_size))
            .await?;
        self.reader.set_chunk_size(self.outbound_chunk_size);

        let mut status = HashMap::new();
        status.insert("level".to_string(), AmfValue::String("status".into()));
        status.insert(
            "code".to_string(),
            AmfValue::String(STATUS_CONNECT_SUCCESS.into()),
        );
        status.insert(
            "description".to_string(),
            AmfValue::String("Connection succeeded.".into()),
        );
        status.insert("objectEncoding".to_string(), AmfValue::Number(0.0));

        self.send_outbound(Outbound::Command(result_payload(
            transaction_id,
            AmfValue::Null,
            AmfValue::Object(status),
        )))
        .await
    }

    async fn handle_create_stream(&mut self, values: &[AmfValue]) -> Result<()> {
        let Some(transaction_id) = number_at(values, 1) else {
            tracing::warn!(session_id = %self.id, "createStream without transaction id, dropping");
            return Ok(());
        };

        // Single-stream profile
        self.stream_id = 1;

        self.send_outbound(Outbound::Command(result_payload(
            transaction_id,
            AmfValue::Null,
            AmfValue::Number(f64::from(self.stream_id)),
        )))
        .await?;

        tracing::debug!(session_id = %self.id, stream_id = self.stream_id, "createStream");
        Ok(())
    }

    async fn handle_release_stream(&mut self, values: &[AmfValue]) -> Result<()> {
        let Some(transaction_id) = number_at(values, 1) else {
            tracing::warn!(session_id = %self.id, "releaseStream without transaction id, dropping");
            return Ok(());
        };

        self.send_outbound(Outbound::Command(result_payload(
            transaction_id,
            AmfValue::Null,
            AmfValue::Null,
        )))
        .await
    }

    async fn handle_fc_publish(&mut self, values: &[AmfValue]) -> Result<()> {
        let Some(transaction_id) = number_at(values, 1) else {
            tracing::warn!(session_id = %self.id, "FCPublish without transaction id, dropping");
            return Ok(());
        };
        let stream_name = string_at(values, 3).unwrap_or_default().to_string();

        self.send_outbound(Outbound::Command(result_payload(
            transaction_id,
            AmfValue::Null,
            AmfValue::Null,
        )))
        .await?;

        self.send_outbound(Outbound::Command(notify_payload(
            "onFCPublish",
            STATUS_PUBLISH_START,
            format!("FCPublish to stream {stream_name}"),
        )))
        .await
    }

    async fn handle_fc_unpublish(&mut self, values: &[AmfValue]) -> Result<()> {
        let Some(transaction_id) = number_at(values, 1) else {
            tracing::warn!(session_id = %self.id, "FCUnpublish without transaction id, dropping");
            return Ok(());
        };
        let stream_name = string_at(values, 3).unwrap_or_default().to_string();

        self.send_outbound(Outbound::Command(result_payload(
            transaction_id,
            AmfValue::Null,
            AmfValue::Null,
        )))
        .await?;

        // FCUnpublish announces the end of publishing
        if self.role == SessionRole::Publishing {
            if let Some(path) = self.full_path() {
                self.emit(SessionEvent::PublishStopped {
                    session_id: self.id.clone(),
                    path,
                    stream_id: self.stream_id,
                })
                .await?;
            }
            self.role = SessionRole::Idle;
        }

        self.send_outbound(Outbound::Command(notify_payload(
            "onFCUnpublish",
            STATUS_UNPUBLISH_SUCCESS,
            format!("FCUnpublish to stream {stream_name}"),
        )))
        .await
    }

    async fn handle_publish(&mut self, values: &[AmfValue]) -> Result<()> {
        let Some(stream_name) = string_at(values, 3) else {
            tracing::warn!(session_id = %self.id, "publish without stream name, dropping");
            return Ok(());
        };
        let stream_name = stream_name.to_string();
        let publish_type = string_at(values, 4).unwrap_or("live").to_string();

        let Some(app) = self.app_name.clone() else {
            tracing::warn!(session_id = %self.id, "publish before connect, dropping");
            return Ok(());
        };
        if self.role != SessionRole::Idle {
            tracing::warn!(session_id = %self.id, role = ?self.role, "publish while already active, dropping");
            return Ok(());
        }

        let path = format!("{app}/{stream_name}");
        self.stream_name = Some(stream_name);
        self.role = SessionRole::Publishing;
        tracing::info!(
            session_id = %self.id,
            path = %path,
            publish_type = %publish_type,
            "publish"
        );

        // Queue the status before announcing the publish so a registry
        // rejection can never reach the peer ahead of Publish.Start
        self.send_outbound(Outbound::Command(status_payload(
            "status",
            STATUS_PUBLISH_START,
            format!("Started publishing stream {path}"),
            Some(&path),
        )))
        .await?;

        self.emit(SessionEvent::PublishStarted {
            session_id: self.id.clone(),
            path,
            stream_id: self.stream_id,
        })
        .await
    }

    async fn handle_play(&mut self, values: &[AmfValue]) -> Result<()> {
        let Some(stream_name) = string_at(values, 3) else {
            tracing::warn!(session_id = %self.id, "play without stream name, dropping");
            return Ok(());
        };
        let stream_name = stream_name.to_string();

        let Some(app) = self.app_name.clone() else {
            tracing::warn!(session_id = %self.id, "play before connect, dropping");
            return Ok(());
        };
        if self.role != SessionRole::Idle {
            tracing::warn!(session_id = %self.id, role = ?self.role, "play while already active, dropping");
            return Ok(());
        }

        // start/duration/reset arguments are accepted and ignored: always
        // live from now
        let path = format!("{app}/{stream_name}");
        self.stream_name = Some(stream_name);
        self.role = SessionRole::Playing;
        tracing::info!(session_id = %self.id, path = %path, "play");

        self.send_outbound(Outbound::Command(status_payload(
            "status",
            STATUS_PLAY_RESET,
            format!("Resetting and playing stream {path}"),
            Some(&path),
        )))
        .await?;

        self.send_outbound(Outbound::Command(status_payload(
            "status",
            STATUS_PLAY_START,
            format!("Started playing stream {path}"),
            Some(&path),
        )))
        .await?;

        self.emit(SessionEvent::PlayStarted {
            session_id: self.id.clone(),
            path,
            stream_id: self.stream_id,
        })
        .await
    }

    fn handle_pause(&mut self, values: &[AmfValue]) -> Result<()> {
        match values.get(3).and_then(AmfValue::as_bool) {
            Some(true) => tracing::info!(session_id = %self.id, "pause requested (ignored)"),
            Some(false) => tracing::info!(session_id = %self.id, "resume requested (ignored)"),
            None => tracing::warn!(session_id = %self.id, "pause without flag"),
        }
        Ok(())
    }

    async fn handle_delete_stream(&mut self, values: &[AmfValue]) -> Result<()> {
        let stream_id = number_at(values, 3);
        tracing::info!(session_id = %self.id, stream_id = ?stream_id, "deleteStream");
        self.stop_active_stream().await
    }

    async fn handle_close_stream(&mut self) -> Result<()> {
        tracing::info!(session_id = %self.id, "closeStream");
        self.stop_active_stream().await
    }

    /// Emit the stop event matching the current role and go idle.
    pub(super) async fn stop_active_stream(&mut self) -> Result<()> {
        if let Some(path) = self.full_path() {
            match self.role {
                SessionRole::Publishing => {
                    self.emit(SessionEvent::PublishStopped {
                        session_id: self.id.clone(),
                        path,
                        stream_id: self.stream_id,
                    })
                    .await?;
                }
                SessionRole::Playing => {
                    self.emit(SessionEvent::PlayStopped {
                        session_id: self.id.clone(),
                        path,
                        stream_id: self.stream_id,
                    })
                    .await?;
                }
                SessionRole::Idle => {}
            }
        }
        self.role = SessionRole::Idle;
        Ok(())
    }
}
