//! Wire protocol for relaychat.
//!
//! This crate defines what game servers and the proxy tier say to each
//! other:
//!
//! - **Types**: [`Envelope`] and its five variants, [`PlayerId`],
//!   [`ServerIdentity`], [`TransportMode`]. Each envelope is one immutable
//!   chat or whisper event.
//! - **Codecs**: [`RelayCodec`] for length-prefixed relay frames,
//!   [`FieldCodec`] for flat broker field maps, and the generic
//!   [`Codec`] trait whose [`JsonCodec`] writes relay payload bodies.
//! - **Control frames** ([`ControlFrame`]): roster bookkeeping between a
//!   game server and the proxy, never surfaced to chat handlers.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Messenger (handlers, main thread)
//! ```

mod codec;
mod control;
mod error;
mod fields;
mod frame;
mod types;

pub use codec::{Codec, JsonCodec};
pub use control::{
    ControlFrame, ControlKind, PlayerPresence, RosterEntry, ServerHello, names_match,
};
pub use error::ProtocolError;
pub use fields::{FieldCodec, FieldMap};
pub use frame::{RELAY_CHANNEL, RelayCodec, RelayFrame};
pub use types::{
    Envelope, EnvelopeKind, GlobalChatEnvelope, NoticeEnvelope, PlayerId, ServerId,
    ServerIdentity, TransportMode, WhisperAckEnvelope, WhisperEnvelope,
    WhisperNotFoundEnvelope, now_millis,
};
