//! Codec trait for serializing payload bodies.
//!
//! Every relay frame carries a JSON payload after its type string.
//! [`RelayCodec`](crate::RelayCodec) hands those bodies to a [`Codec`];
//! [`JsonCodec`] is the one in use because payloads have to stay readable
//! by servers running older builds.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Turns payload bodies into bytes and back.
///
/// `Send + Sync + 'static` because codecs live inside long-running link
/// and consumer tasks.
pub trait Codec: Send + Sync + 'static {
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed or do
    /// not match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use relaychat_protocol::{Codec, JsonCodec, NoticeEnvelope, ServerIdentity};
///
/// let notice = NoticeEnvelope::new(&ServerIdentity::new("s1", "Lobby"), "Admin", "restart at 5");
///
/// let bytes = JsonCodec.encode(&notice).unwrap();
/// let decoded: NoticeEnvelope = JsonCodec.decode(&bytes).unwrap();
/// assert_eq!(notice, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PlayerId, ServerIdentity, WhisperEnvelope};

    #[test]
    fn test_json_codec_keeps_non_latin_text() {
        let whisper = WhisperEnvelope::new(
            &ServerIdentity::new("s1", "로비"),
            PlayerId::random(),
            "앤",
            "Bob",
            "안녕하세요 👋 ünïcödé",
        );
        let bytes = JsonCodec.encode(&whisper).unwrap();
        let decoded: WhisperEnvelope = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(decoded.text(), "안녕하세요 👋 ünïcödé");
        assert_eq!(decoded, whisper);
    }

    #[test]
    fn test_json_codec_decode_garbage_returns_decode_error() {
        let result: Result<WhisperEnvelope, _> = JsonCodec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
