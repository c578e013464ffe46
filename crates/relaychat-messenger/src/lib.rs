//! Transport strategies for relaychat.
//!
//! A game server talks to the rest of the fleet through exactly one
//! [`ChatMessenger`], picked at startup from the configured
//! [`TransportMode`](relaychat_protocol::TransportMode):
//!
//! - [`DisabledMessenger`]: single server, every send is a no-op.
//! - [`ProcessRelayMessenger`]: frames go through the proxy tier over a
//!   [`RelayLink`] ([`WebSocketRelayLink`] in production,
//!   [`MemoryRelayLink`] in tests and embedded setups).
//! - [`BrokerStreamMessenger`]: entries go through named streams on a
//!   [`StreamBroker`] ([`MemoryBroker`] ships in-process).
//!
//! Inbound envelopes never reach chat code from a network task. They are
//! pushed onto an [`InboundQueue`] and delivered by the
//! [`MainThreadDispatcher`] on whichever thread drives it.
//!
//! ```text
//! link / consumer task ──decode──→ InboundQueue ──→ MainThreadDispatcher ──→ InboundHandler
//! ```

#![allow(async_fn_in_trait)]

mod broker;
mod disabled;
mod dispatch;
mod error;
mod lifecycle;
mod messenger;
mod relay;
mod throttle;

pub use broker::{
    BrokerError, BrokerSettings, BrokerStreamMessenger, MemoryBroker, StreamBroker,
    StreamEntry, StreamNames,
};
pub use disabled::DisabledMessenger;
pub use dispatch::{
    InboundHandler, InboundQueue, MainThreadDispatcher, Subscriptions, inbound_queue,
};
pub use error::MessengerError;
pub use lifecycle::MessengerState;
pub use messenger::{ChatMessenger, SharedMessenger};
pub use relay::{
    HelloFrame, LinkIo, MemoryRelayLink, MemoryRelayPeer, ProcessRelayMessenger, RelayLink,
    WebSocketRelayLink, memory_relay,
};
pub use throttle::LogThrottle;
