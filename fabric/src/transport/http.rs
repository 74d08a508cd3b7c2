//! HTTP transport: one JSON-RPC request per POST body, one JSON-RPC
//! response per response body.
//!
//! Request/response only. `receive` is unsupported; callers that need the
//! reply use [`Transport::round_trip`], and clients operate synchronously
//! over this variant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::WireError;
use crate::message::Message;
use crate::transport::Transport;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Request/response transport posting frames to a fixed endpoint URL.
pub struct HttpTransport {
    client: Client,
    url: String,
    closed: AtomicBool,
}

impl HttpTransport {
    /// `url` is the JSON-RPC endpoint (e.g. `http://127.0.0.1:8084/rpc`).
    pub fn new(url: impl Into<String>) -> Result<Self, WireError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WireError::internal(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<(), WireError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(WireError::connection_lost("transport closed"))
        } else {
            Ok(())
        }
    }

    async fn post(&self, message: &Message) -> Result<reqwest::Response, WireError> {
        self.check_open()?;
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(WireError::internal(format!(
                "http {}: {}",
                status, self.url
            )));
        }
        Ok(response)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> WireError {
    if e.is_connect() || e.is_timeout() {
        WireError::connection_lost(format!("http: {}", e))
    } else {
        WireError::internal(format!("http: {}", e))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, message: &Message) -> Result<(), WireError> {
        self.post(message).await.map(|_| ())
    }

    async fn receive(&self) -> Result<Message, WireError> {
        Err(WireError::internal(
            "receive not supported on http transport",
        ))
    }

    async fn round_trip(&self, message: &Message) -> Result<Message, WireError> {
        let response = self.post(message).await?;
        response
            .json::<Message>()
            .await
            .map_err(|e| WireError::internal(format!("response json: {}", e)))
    }

    async fn close(&self) -> Result<(), WireError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn bidirectional(&self) -> bool {
        false
    }
}
