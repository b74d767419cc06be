//! Media and script message handling
//!
//! Audio and video bodies pass through untouched; only the first byte or
//! two are inspected for classification. Script messages are decoded for
//! onMetaData; everything else is log-only.

use crate::amf::{self, AmfValue};
use crate::error::Result;
use crate::events::SessionEvent;
use crate::media::flv::{
    payload_byte, AacPacketType, AudioCodec, AvcPacketType, FrameClass, VideoCodec,
};
use crate::protocol::Message;
use crate::session::state::SessionRole;
use crate::session::Session;

impl Session {
    pub(super) async fn handle_audio(&mut self, message: Message) -> Result<()> {
        if self.role != SessionRole::Publishing {
            tracing::warn!(session_id = %self.id, "audio data while not publishing, dropping");
            return Ok(());
        }
        let Some(path) = self.full_path() else {
            tracing::warn!(session_id = %self.id, "audio data without a stream path, dropping");
            return Ok(());
        };

        let Some(first) = payload_byte(&message.payload, 0) else {
            tracing::warn!(session_id = %self.id, "empty audio payload, dropping");
            return Ok(());
        };

        self.stats.on_audio(message.payload_len());

        let codec = AudioCodec::from_byte(first);
        if codec == Some(AudioCodec::Aac) {
            let packet_type = payload_byte(&message.payload, 1).and_then(AacPacketType::from_byte);
            if packet_type == Some(AacPacketType::SequenceHeader) {
                tracing::info!(
                    session_id = %self.id,
                    path = %path,
                    size = message.payload_len(),
                    timestamp = message.header.timestamp,
                    "AAC sequence header"
                );
            }
        }

        tracing::trace!(
            session_id = %self.id,
            path = %path,
            codec = ?codec,
            size = message.payload_len(),
            timestamp = message.header.timestamp,
            "audio data"
        );

        self.emit(SessionEvent::AudioData {
            session_id: self.id.clone(),
            path,
            timestamp: message.header.timestamp,
            payload: message.payload,
        })
        .await
    }

    pub(super) async fn handle_video(&mut self, message: Message) -> Result<()> {
        if self.role != SessionRole::Publishing {
            tracing::warn!(session_id = %self.id, "video data while not publishing, dropping");
            return Ok(());
        }
        let Some(path) = self.full_path() else {
            tracing::warn!(session_id = %self.id, "video data without a stream path, dropping");
            return Ok(());
        };

        let Some(first) = payload_byte(&message.payload, 0) else {
            tracing::warn!(session_id = %self.id, "empty video payload, dropping");
            return Ok(());
        };

        let Some(frame_class) = FrameClass::from_byte(first) else {
            tracing::warn!(
                session_id = %self.id,
                first_byte = first,
                "unknown video frame class, dropping"
            );
            return Ok(());
        };

        self.stats
            .on_video(message.payload_len(), frame_class.is_keyframe());

        let codec = VideoCodec::from_byte(first);
        if codec == Some(VideoCodec::Avc) {
            let packet_type = payload_byte(&message.payload, 1).and_then(AvcPacketType::from_byte);
            if packet_type == Some(AvcPacketType::SequenceHeader) {
                tracing::info!(
                    session_id = %self.id,
                    path = %path,
                    size = message.payload_len(),
                    timestamp = message.header.timestamp,
                    "AVC sequence header"
                );
                // AVCDecoderConfigurationRecord starts at offset 5
                if message.payload_len() > 10 {
                    tracing::debug!(
                        version = payload_byte(&message.payload, 5),
                        profile = payload_byte(&message.payload, 6),
                        compatibility = payload_byte(&message.payload, 7),
                        level = payload_byte(&message.payload, 8),
                        "AVC configuration"
                    );
                }
            }
        }

        tracing::trace!(
            session_id = %self.id,
            path = %path,
            frame_class = %frame_class,
            codec = ?codec,
            size = message.payload_len(),
            timestamp = message.header.timestamp,
            "video data"
        );

        self.emit(SessionEvent::VideoData {
            session_id: self.id.clone(),
            path,
            timestamp: message.header.timestamp,
            frame_class,
            payload: message.payload,
        })
        .await
    }

    pub(super) async fn handle_script_data(&mut self, message: Message) -> Result<()> {
        let mut body = message.payload_bytes();
        let values = match amf::decode_sequence(&mut body) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "undecodable script data, dropping");
                return Ok(());
            }
        };

        // OBS wraps metadata: ("@setDataFrame", "onMetaData", {...})
        let mut values = &values[..];
        if values.first().and_then(AmfValue::as_str) == Some("@setDataFrame") {
            values = &values[1..];
        }

        let Some(name) = values.first().and_then(AmfValue::as_str) else {
            tracing::warn!(session_id = %self.id, "script data without a name, dropping");
            return Ok(());
        };

        match name {
            "onMetaData" => self.handle_metadata(values).await,
            "onTextData" => {
                tracing::info!(session_id = %self.id, "onTextData received");
                Ok(())
            }
            other => {
                tracing::debug!(session_id = %self.id, script = %other, "unhandled script data");
                Ok(())
            }
        }
    }

    async fn handle_metadata(&mut self, values: &[AmfValue]) -> Result<()> {
        let Some(path) = self.full_path() else {
            tracing::warn!(session_id = %self.id, "metadata without a stream path, dropping");
            return Ok(());
        };

        let Some(metadata) = values.get(1).and_then(AmfValue::as_object) else {
            tracing::warn!(session_id = %self.id, "onMetaData without an object, dropping");
            return Ok(());
        };
        let metadata = metadata.clone();

        tracing::info!(
            session_id = %self.id,
            path = %path,
            width = metadata.get("width").and_then(AmfValue::as_number),
            height = metadata.get("height").and_then(AmfValue::as_number),
            framerate = metadata.get("framerate").and_then(AmfValue::as_number),
            video_codec = metadata.get("videocodecid").and_then(AmfValue::as_number),
            audio_codec = metadata.get("audiocodecid").and_then(AmfValue::as_number),
            keys = metadata.len(),
            "onMetaData"
        );

        self.emit(SessionEvent::Metadata {
            session_id: self.id.clone(),
            path,
            metadata,
        })
        .await
    }
}
