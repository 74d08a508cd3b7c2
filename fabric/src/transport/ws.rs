//! WebSocket transport: one JSON object per text frame.
//!
//! Used on both ends: [`WsTransport::connect`] dials a server (client side),
//! [`WsTransport::accept`] upgrades an accepted TCP stream (module side).
//! The socket is split so sends and the receive loop proceed concurrently.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{accept_async, connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::WireError;
use crate::message::Message;
use crate::transport::Transport;

/// Bidirectional framed transport over a websocket.
pub struct WsTransport<S> {
    sink: Mutex<SplitSink<WebSocketStream<S>, WsMessage>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
    closed: AtomicBool,
}

impl WsTransport<MaybeTlsStream<TcpStream>> {
    /// Dials `url` (e.g. `ws://127.0.0.1:8090`) and completes the websocket
    /// handshake.
    pub async fn connect(url: &str) -> Result<Self, WireError> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| WireError::connection_lost(format!("connect {}: {}", url, e)))?;
        Ok(Self::from_socket(socket))
    }
}

impl WsTransport<TcpStream> {
    /// Accepts the websocket handshake on an already-accepted TCP stream.
    pub async fn accept(stream: TcpStream) -> Result<Self, WireError> {
        let socket = accept_async(stream)
            .await
            .map_err(|e| WireError::connection_lost(format!("accept: {}", e)))?;
        Ok(Self::from_socket(socket))
    }
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn from_socket(socket: WebSocketStream<S>) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<(), WireError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(WireError::connection_lost("transport closed"))
        } else {
            Ok(())
        }
    }
}

fn map_ws_error(e: tungstenite::Error) -> WireError {
    match e {
        tungstenite::Error::ConnectionClosed
        | tungstenite::Error::AlreadyClosed
        | tungstenite::Error::Io(_)
        | tungstenite::Error::Protocol(_) => {
            WireError::connection_lost(format!("websocket: {}", e))
        }
        other => WireError::internal(format!("websocket: {}", other)),
    }
}

#[async_trait]
impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, message: &Message) -> Result<(), WireError> {
        self.check_open()?;
        let text = message
            .to_json()
            .map_err(|e| WireError::internal(format!("encode frame: {}", e)))?;
        let mut sink = self.sink.lock().await;
        sink.send(WsMessage::Text(text)).await.map_err(|e| {
            self.closed.store(true, Ordering::SeqCst);
            map_ws_error(e)
        })
    }

    async fn receive(&self) -> Result<Message, WireError> {
        self.check_open()?;
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return Message::from_json(&text)
                        .map_err(|e| WireError::internal(format!("frame json: {}", e)));
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes);
                    return Message::from_json(&text)
                        .map_err(|e| WireError::internal(format!("frame json: {}", e)));
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    self.closed.store(true, Ordering::SeqCst);
                    return Err(WireError::connection_lost("peer closed"));
                }
                Some(Ok(_)) => continue, // control frames
                Some(Err(e)) => {
                    let mapped = map_ws_error(e);
                    if mapped.is_connection_lost() {
                        self.closed.store(true, Ordering::SeqCst);
                    }
                    return Err(mapped);
                }
            }
        }
    }

    async fn close(&self) -> Result<(), WireError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut sink = self.sink.lock().await;
        let _ = sink.close().await;
        Ok(())
    }
}
