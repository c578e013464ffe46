//! Error types for the protocol layer.
//!
//! Every failure here means "this frame or field map cannot become an
//! envelope". Callers log and discard; none of these should ever take a
//! server down.

/// Errors that can occur while encoding or decoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a payload body failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload body is not valid JSON for the announced kind.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The type string does not name a kind this decoder understands.
    ///
    /// Peers running a newer protocol version may send kinds we do not
    /// know about yet. This is expected during rolling deploys.
    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    /// A required field is absent from a broker field map.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field is present but its value cannot be parsed.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    /// The frame ended before a length-prefixed string was complete.
    #[error("frame truncated")]
    Truncated,

    /// A string is longer than a u16 length prefix can describe.
    #[error("string of {0} bytes exceeds the 65535-byte frame limit")]
    PayloadTooLarge(usize),

    /// A length-prefixed string is not valid UTF-8.
    #[error("frame string is not valid UTF-8")]
    InvalidUtf8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind_display_names_the_kind() {
        let err = ProtocolError::UnknownKind("TELEPORT".into());
        assert_eq!(err.to_string(), "unknown message kind: TELEPORT");
    }

    #[test]
    fn test_invalid_field_display() {
        let err = ProtocolError::InvalidField {
            field: "playerUuid",
            reason: "not a uuid".into(),
        };
        assert_eq!(err.to_string(), "invalid field playerUuid: not a uuid");
    }
}
