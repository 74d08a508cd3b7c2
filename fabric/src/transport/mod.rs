//! Transport abstraction: a send/receive/close contract with websocket,
//! HTTP and in-memory channel variants.
//!
//! The *bidirectional* variants (websocket, channel) support concurrent
//! `send` while a `receive` is outstanding, so a client's receive loop can
//! run independently of request submission. The *request/response* variant
//! (HTTP POST) supports no `receive`; callers use [`Transport::round_trip`]
//! instead and the client operates synchronously over it.

mod channel;
mod http;
mod ws;

pub use channel::{channel_pair, ChannelTransport};
pub use http::HttpTransport;
pub use ws::WsTransport;

use async_trait::async_trait;

use crate::error::WireError;
use crate::message::Message;

/// One framed connection to a peer. All failures caused by the peer going
/// away surface as wire error `-32000` (connection lost).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Serializes the message to JSON and writes one frame.
    async fn send(&self, message: &Message) -> Result<(), WireError>;

    /// Reads one frame and deserializes it. Unsupported on
    /// request/response transports.
    async fn receive(&self) -> Result<Message, WireError>;

    /// One-shot exchange: write the request frame, return the response
    /// frame. Only request/response transports implement this.
    async fn round_trip(&self, _message: &Message) -> Result<Message, WireError> {
        Err(WireError::internal(
            "round_trip not supported on this transport",
        ))
    }

    /// Idempotent; after close, `send` and `receive` reject.
    async fn close(&self) -> Result<(), WireError>;

    /// Whether `receive` can run concurrently with `send`. False for
    /// request/response transports; the client then uses `round_trip` and
    /// starts no receive loop.
    fn bidirectional(&self) -> bool {
        true
    }
}
