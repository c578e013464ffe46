//! Relay frame codec.
//!
//! Every frame on the relay channel is two length-prefixed UTF-8 strings:
//!
//! ```text
//! ┌──────────┬───────────────┬──────────┬────────────────────────┐
//! │ u16 BE n │ type (n bytes)│ u16 BE m │ JSON payload (m bytes) │
//! └──────────┴───────────────┴──────────┴────────────────────────┘
//! ```
//!
//! The type string is one of the [`EnvelopeKind`] or [`ControlKind`]
//! names. The proxy only needs the type and, for whispers, the target name;
//! everything else it forwards byte-for-byte.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    Codec, ControlFrame, ControlKind, Envelope, EnvelopeKind, JsonCodec, PlayerId, ProtocolError,
    WhisperNotFoundEnvelope,
};

/// Name of the relay channel shared by game servers and the proxy.
pub const RELAY_CHANNEL: &str = "relaychat:main";

/// Longest string a u16 length prefix can describe.
const MAX_STRING_LEN: usize = u16::MAX as usize;

/// A decoded relay frame: either a chat envelope or a control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    Envelope(Envelope),
    Control(ControlFrame),
}

/// Encodes and decodes relay frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayCodec;

impl RelayCodec {
    /// Encodes an envelope into a relay frame.
    ///
    /// # Errors
    /// [`ProtocolError::PayloadTooLarge`] if the JSON body exceeds the
    /// frame limit; [`ProtocolError::Encode`] if serialization fails.
    pub fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
        let kind = envelope.kind().as_str();
        let body = match envelope {
            Envelope::GlobalChat(e) => tagged_json(kind, e)?,
            Envelope::Notice(e) => tagged_json(kind, e)?,
            Envelope::Whisper(e) => tagged_json(kind, e)?,
            Envelope::WhisperAck(e) => tagged_json(kind, e)?,
            Envelope::WhisperNotFound(e) => tagged_json(kind, e)?,
        };
        write_frame(kind, &body)
    }

    /// Encodes a control frame.
    pub fn encode_control(&self, frame: &ControlFrame) -> Result<Vec<u8>, ProtocolError> {
        let kind = frame.kind().as_str();
        let body = match frame {
            ControlFrame::Hello(hello) => tagged_json(kind, hello)?,
            ControlFrame::Presence(presence) => tagged_json(kind, presence)?,
        };
        write_frame(kind, &body)
    }

    /// Decodes a frame that must be a chat envelope.
    ///
    /// Control frames are reported as [`ProtocolError::UnknownKind`]:
    /// game servers have no business receiving them.
    pub fn decode(&self, data: &[u8]) -> Result<Envelope, ProtocolError> {
        match self.decode_frame(data)? {
            RelayFrame::Envelope(envelope) => Ok(envelope),
            RelayFrame::Control(frame) => {
                Err(ProtocolError::UnknownKind(frame.kind().as_str().to_string()))
            }
        }
    }

    /// Decodes any relay frame.
    pub fn decode_frame(&self, data: &[u8]) -> Result<RelayFrame, ProtocolError> {
        let (type_name, payload) = read_frame(data)?;

        if let Ok(kind) = type_name.parse::<EnvelopeKind>() {
            return decode_envelope(kind, payload).map(RelayFrame::Envelope);
        }

        let frame = match type_name.parse::<ControlKind>()? {
            ControlKind::ServerHello => ControlFrame::Hello(from_json(payload)?),
            ControlKind::PlayerPresence => ControlFrame::Presence(from_json(payload)?),
        };
        Ok(RelayFrame::Control(frame))
    }
}

fn decode_envelope(kind: EnvelopeKind, payload: &str) -> Result<Envelope, ProtocolError> {
    let envelope = match kind {
        EnvelopeKind::GlobalChat => Envelope::GlobalChat(from_json(payload)?),
        EnvelopeKind::Notice => Envelope::Notice(from_json(payload)?),
        EnvelopeKind::Whisper => Envelope::Whisper(from_json(payload)?),
        EnvelopeKind::WhisperAck => Envelope::WhisperAck(from_json(payload)?),
        EnvelopeKind::WhisperNotFound => {
            Envelope::WhisperNotFound(decode_not_found(payload)?)
        }
    };
    Ok(envelope)
}

/// Older proxies send not-found replies as `"<senderUuid>:<targetName>"`
/// instead of JSON.
fn decode_not_found(payload: &str) -> Result<WhisperNotFoundEnvelope, ProtocolError> {
    if payload.trim_start().starts_with('{') {
        return from_json(payload);
    }

    let (sender, target) = payload
        .split_once(':')
        .ok_or(ProtocolError::MissingField("targetName"))?;
    let sender_id: PlayerId = sender.parse().map_err(|e: uuid::Error| {
        ProtocolError::InvalidField {
            field: "senderUuid",
            reason: e.to_string(),
        }
    })?;
    Ok(WhisperNotFoundEnvelope::new(sender_id, target))
}

/// Payload body with the frame's type repeated inside it, which older
/// decoders look for.
fn tagged_json<T: Serialize>(kind: &str, value: &T) -> Result<String, ProtocolError> {
    let mut json = serde_json::to_value(value).map_err(ProtocolError::Encode)?;
    if let Value::Object(map) = &mut json {
        map.insert("type".to_string(), Value::String(kind.to_string()));
    }
    let bytes = JsonCodec.encode(&json)?;
    String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)
}

fn from_json<T: DeserializeOwned>(payload: &str) -> Result<T, ProtocolError> {
    JsonCodec.decode(payload.as_bytes())
}

fn write_frame(type_name: &str, payload: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::with_capacity(4 + type_name.len() + payload.len());
    put_str(&mut buf, type_name)?;
    put_str(&mut buf, payload)?;
    Ok(buf)
}

fn read_frame(data: &[u8]) -> Result<(&str, &str), ProtocolError> {
    let mut input = data;
    let type_name = take_str(&mut input)?;
    let payload = take_str(&mut input)?;
    Ok((type_name, payload))
}

fn put_str(buf: &mut Vec<u8>, s: &str) -> Result<(), ProtocolError> {
    let len = s.len();
    if len > MAX_STRING_LEN {
        return Err(ProtocolError::PayloadTooLarge(len));
    }
    buf.extend_from_slice(&(len as u16).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn take_str<'a>(input: &mut &'a [u8]) -> Result<&'a str, ProtocolError> {
    let (prefix, rest) = input.split_at_checked(2).ok_or(ProtocolError::Truncated)?;
    let len = u16::from_be_bytes([prefix[0], prefix[1]]) as usize;
    let (bytes, rest) = rest.split_at_checked(len).ok_or(ProtocolError::Truncated)?;
    *input = rest;
    std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)
}

// =========================================================================
// Tests
// =========================================================================
