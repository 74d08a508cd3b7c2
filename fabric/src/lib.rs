//! # Fabric
//!
//! The tool-RPC fabric: a bidirectional JSON-RPC 2.0 dialect over framed
//! transports, shared by every service module and its host.
//!
//! ## Main modules
//!
//! - [`message`]: the wire envelope ([`Message`], [`MessageId`],
//!   [`ErrorObject`]) and the standard method names ([`method`]).
//! - [`error`]: [`WireError`] and the JSON-RPC code taxonomy.
//! - [`tool`]: [`Tool`], [`ToolHandler`], [`ToolSpec`], [`Resource`],
//!   [`Prompt`], schema-driven argument validation.
//! - [`transport`]: the [`Transport`] contract with websocket
//!   ([`WsTransport`]), HTTP ([`HttpTransport`]) and in-memory
//!   ([`ChannelTransport`]) variants.
//! - [`server`]: [`ToolServer`] — registers tools and serves one transport.
//! - [`client`]: [`ToolClient`] — persistent connection with request
//!   multiplexing, heartbeats and reconnection.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fabric::{channel_pair, handler_fn, Tool, ToolServer};
//! use serde_json::{json, Value};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut server = ToolServer::new("example", "1.0.0");
//! server.add_tool(Tool::new(
//!     "search",
//!     "Search for information",
//!     json!({
//!         "type": "object",
//!         "properties": { "query": { "type": "string" } },
//!         "required": ["query"]
//!     }),
//!     handler_fn(|args| async move {
//!         Ok(Value::String(format!("results for {}", args["query"])))
//!     }),
//! ));
//!
//! let (local, remote) = channel_pair();
//! tokio::spawn(async move { server.serve(Arc::new(remote)).await });
//! # let _ = local;
//! # }
//! ```

pub mod client;
pub mod error;
pub mod message;
pub mod server;
pub mod tool;
pub mod transport;

pub use client::{factory_fn, ClientConfig, ConnectionState, ToolClient, TransportFactory};
pub use error::{
    WireError, CODE_CONNECTION_LOST, CODE_INTERNAL, CODE_INVALID_PARAMS, CODE_METHOD_NOT_FOUND,
};
pub use message::{method, ErrorObject, Message, MessageId, JSONRPC_VERSION, PROTOCOL_VERSION};
pub use server::ToolServer;
pub use tool::{
    first_text, handler_fn, validate_args, Prompt, Resource, Tool, ToolHandler, ToolSpec,
};
pub use transport::{channel_pair, ChannelTransport, HttpTransport, Transport, WsTransport};
