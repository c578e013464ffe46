//! Proxy tier for relaychat.
//!
//! Game servers running the process-relay transport connect here. The
//! proxy keeps a roster per downstream server, fed by `SERVER_HELLO` and
//! `PLAYER_PRESENCE` control frames, and uses it to route every envelope:
//!
//! | frame | goes to |
//! |---|---|
//! | `GLOBAL_CHAT`, `NOTICE` | every downstream, origin included |
//! | `WHISPER` | the one server hosting the target, or a `WHISPER_NOT_FOUND` back to the origin |
//! | `WHISPER_ACK` | the server named in `targetServerId` |
//! | `WHISPER_NOT_FOUND` | nowhere; only the proxy produces these |
//!
//! [`ProxyRouter`] makes those decisions without touching the network,
//! [`ProxyHub`] applies them to live connections, and [`ProxyServer`]
//! accepts WebSocket connections and hands them to the hub.

#![allow(async_fn_in_trait)]

mod config;
mod error;
mod hub;
mod registry;
mod router;
mod server;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use hub::ProxyHub;
pub use registry::{DownstreamRegistry, DownstreamSender};
pub use router::{DropReason, ProxyRouter, Route};
pub use server::ProxyServer;
