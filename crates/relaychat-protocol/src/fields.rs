//! Flat field-map codec for broker stream entries.
//!
//! Broker entries are `HashMap<String, String>`, so every value is a string
//! and numbers travel in decimal. Decoding is forgiving about the fields a
//! receiver can make up (display names, timestamps) and strict about the
//! ones it cannot (ids, text, targets).

use std::collections::HashMap;

use crate::{
    Envelope, EnvelopeKind, GlobalChatEnvelope, NoticeEnvelope, PlayerId, ProtocolError,
    ServerId, WhisperAckEnvelope, WhisperEnvelope, WhisperNotFoundEnvelope, now_millis,
};

/// One broker stream entry.
pub type FieldMap = HashMap<String, String>;

const TYPE: &str = "type";

/// Encodes envelopes into broker field maps and back.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldCodec;

impl FieldCodec {
    /// Flattens an envelope into a field map. The `type` field is always
    /// written.
    pub fn encode(&self, envelope: &Envelope) -> FieldMap {
        let mut map = FieldMap::new();
        map.insert(TYPE.into(), envelope.kind().as_str().into());

        match envelope {
            Envelope::GlobalChat(e) => {
                map.insert("serverId".into(), e.origin_server_id.to_string());
                map.insert("serverDisplayName".into(), e.origin_server_display_name.clone());
                map.insert("playerUuid".into(), e.player_id.to_string());
                map.insert("playerName".into(), e.player_name.clone());
                map.insert("message".into(), e.text.clone());
                map.insert("timestamp".into(), e.sent_at_millis.to_string());
            }
            Envelope::Notice(e) => {
                map.insert("serverId".into(), e.origin_server_id.to_string());
                map.insert("senderName".into(), e.sender_name.clone());
                map.insert("message".into(), e.text.clone());
                map.insert("timestamp".into(), e.sent_at_millis.to_string());
            }
            Envelope::Whisper(e) => {
                map.insert("senderUuid".into(), e.sender_id.to_string());
                map.insert("senderName".into(), e.sender_name.clone());
                map.insert("senderServerId".into(), e.origin_server_id.to_string());
                map.insert("targetName".into(), e.target_name.clone());
                map.insert("message".into(), e.text.clone());
                map.insert("timestamp".into(), e.sent_at_millis.to_string());
            }
            Envelope::WhisperAck(e) => {
                map.insert("targetUuid".into(), e.target_id.to_string());
                map.insert("success".into(), e.success.to_string());
                if let Some(server) = &e.target_server_id {
                    map.insert("targetServerId".into(), server.to_string());
                }
            }
            Envelope::WhisperNotFound(e) => {
                map.insert("senderUuid".into(), e.sender_id.to_string());
                map.insert("targetName".into(), e.target_name.clone());
            }
        }
        map
    }

    /// Decodes an entry whose kind is given by its `type` field.
    ///
    /// # Errors
    /// [`ProtocolError::MissingField`] if `type` is absent,
    /// [`ProtocolError::UnknownKind`] if it names no envelope kind.
    pub fn decode(&self, map: &FieldMap) -> Result<Envelope, ProtocolError> {
        let kind: EnvelopeKind = required(map, TYPE)?.parse()?;
        self.decode_as(kind, map)
    }

    /// Decodes an entry as `kind`, ignoring any `type` field.
    ///
    /// Used for single-kind streams, where older publishers leave `type`
    /// out.
    pub fn decode_as(&self, kind: EnvelopeKind, map: &FieldMap) -> Result<Envelope, ProtocolError> {
        let envelope = match kind {
            EnvelopeKind::GlobalChat => Envelope::GlobalChat(GlobalChatEnvelope {
                origin_server_id: ServerId::new(required(map, "serverId")?),
                origin_server_display_name: optional(map, "serverDisplayName", "Server"),
                player_id: player_id(map, "playerUuid")?,
                player_name: optional(map, "playerName", "Unknown"),
                text: required(map, "message")?.to_string(),
                sent_at_millis: timestamp(map),
            }),
            EnvelopeKind::Notice => Envelope::Notice(NoticeEnvelope {
                origin_server_id: ServerId::new(required(map, "serverId")?),
                sender_name: optional(map, "senderName", "Unknown"),
                text: required(map, "message")?.to_string(),
                sent_at_millis: timestamp(map),
            }),
            EnvelopeKind::Whisper => Envelope::Whisper(WhisperEnvelope {
                sender_id: player_id(map, "senderUuid")?,
                sender_name: optional(map, "senderName", "Unknown"),
                origin_server_id: ServerId::new(required(map, "senderServerId")?),
                target_name: required(map, "targetName")?.to_string(),
                text: required(map, "message")?.to_string(),
                sent_at_millis: timestamp(map),
            }),
            EnvelopeKind::WhisperAck => Envelope::WhisperAck(WhisperAckEnvelope {
                target_id: player_id(map, "targetUuid")?,
                success: flag(map, "success")?,
                target_server_id: map.get("targetServerId").map(|s| ServerId::new(s.as_str())),
            }),
            EnvelopeKind::WhisperNotFound => Envelope::WhisperNotFound(WhisperNotFoundEnvelope {
                sender_id: player_id(map, "senderUuid")?,
                target_name: required(map, "targetName")?.to_string(),
            }),
        };
        Ok(envelope)
    }
}

fn required<'a>(map: &'a FieldMap, field: &'static str) -> Result<&'a str, ProtocolError> {
    map.get(field)
        .map(String::as_str)
        .ok_or(ProtocolError::MissingField(field))
}

fn optional(map: &FieldMap, field: &str, fallback: &str) -> String {
    map.get(field).cloned().unwrap_or_else(|| fallback.to_string())
}

fn player_id(map: &FieldMap, field: &'static str) -> Result<PlayerId, ProtocolError> {
    required(map, field)?
        .parse()
        .map_err(|e: uuid::Error| ProtocolError::InvalidField {
            field,
            reason: e.to_string(),
        })
}

fn flag(map: &FieldMap, field: &'static str) -> Result<bool, ProtocolError> {
    required(map, field)?
        .parse()
        .map_err(|e: std::str::ParseBoolError| ProtocolError::InvalidField {
            field,
            reason: e.to_string(),
        })
}

fn timestamp(map: &FieldMap) -> u64 {
    map.get("timestamp")
        .and_then(|t| t.parse().ok())
        .unwrap_or_else(now_millis)
}
