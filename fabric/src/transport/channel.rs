//! Paired in-memory transport over tokio channels.
//!
//! [`channel_pair`] returns two connected ends; frames sent on one are
//! received on the other. Used by protocol tests and by hosts that embed a
//! tool server in-process.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use crate::error::WireError;
use crate::message::Message;
use crate::transport::Transport;

/// One end of an in-memory duplex pair.
pub struct ChannelTransport {
    tx: Mutex<Option<UnboundedSender<Message>>>,
    rx: Mutex<UnboundedReceiver<Message>>,
    closed: AtomicBool,
}

/// Builds two connected transports.
pub fn channel_pair() -> (ChannelTransport, ChannelTransport) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        ChannelTransport {
            tx: Mutex::new(Some(a_tx)),
            rx: Mutex::new(b_rx),
            closed: AtomicBool::new(false),
        },
        ChannelTransport {
            tx: Mutex::new(Some(b_tx)),
            rx: Mutex::new(a_rx),
            closed: AtomicBool::new(false),
        },
    )
}

impl ChannelTransport {
    fn check_open(&self) -> Result<(), WireError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(WireError::connection_lost("transport closed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, message: &Message) -> Result<(), WireError> {
        self.check_open()?;
        let guard = self.tx.lock().await;
        let tx = guard
            .as_ref()
            .ok_or_else(|| WireError::connection_lost("transport closed"))?;
        tx.send(message.clone())
            .map_err(|_| WireError::connection_lost("peer closed"))
    }

    async fn receive(&self) -> Result<Message, WireError> {
        self.check_open()?;
        let mut rx = self.rx.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| WireError::connection_lost("peer closed"))
    }

    async fn close(&self) -> Result<(), WireError> {
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the sender wakes the peer's receive with peer-closed.
        self.tx.lock().await.take();
        Ok(())
    }
}
