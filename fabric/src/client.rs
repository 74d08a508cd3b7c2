//! Orchestrator-side endpoint: one persistent connection to one tool
//! server, with request multiplexing, heartbeats and reconnection.
//!
//! Construction takes a *transport factory* so the client can dial the same
//! server again after a fault. A successful connect runs the `initialize`
//! handshake and spawns three background tasks:
//!
//! - **receive loop** — routes incoming frames to waiters in the pending
//!   table by correlation id; tolerates up to
//!   [`ClientConfig::max_receive_errors`] consecutive unknown errors.
//! - **heartbeat loop** — pings every [`ClientConfig::heartbeat_interval`]
//!   and awaits the pong for [`ClientConfig::heartbeat_wait`]; a pong
//!   timeout only warns, a send failure marks the client disconnected.
//! - **reconnect loop** — polls the connection state; on disconnect, waits
//!   [`ClientConfig::reconnect_delay`], dials the factory and re-runs the
//!   handshake. Gives up after [`ClientConfig::max_reconnect_attempts`]
//!   consecutive failures; success resets the counter.
//!
//! Concurrent `call_tool` invocations on one client are safe; responses are
//! demultiplexed by correlation id and ordering between calls is not
//! guaranteed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::WireError;
use crate::message::{method, Message, MessageId, PROTOCOL_VERSION};
use crate::tool::ToolSpec;
use crate::transport::Transport;

/// Produces a fresh transport to the same server each time it is called.
pub type TransportFactory =
    Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn Transport>, WireError>> + Send + Sync>;

/// Wraps an async closure as a [`TransportFactory`].
pub fn factory_fn<F, Fut>(f: F) -> TransportFactory
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Arc<dyn Transport>, WireError>> + Send + 'static,
{
    Box::new(move || -> BoxFuture<'static, Result<Arc<dyn Transport>, WireError>> {
        Box::pin(f())
    })
}

/// Connection lifecycle. Only `Connected` accepts new requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Tunables for one client. Defaults follow the dialect's conventions.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub client_name: String,
    pub client_version: String,
    /// Default deadline for `call_tool` and friends.
    pub request_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_wait: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    /// Consecutive unknown receive errors tolerated before disconnecting.
    pub max_receive_errors: u32,
    /// How often the reconnect loop samples the connection state.
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: "switchboard-client".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            request_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_wait: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 3,
            max_receive_errors: 5,
            poll_interval: Duration::from_secs(1),
        }
    }
}

struct ClientInner {
    config: ClientConfig,
    factory: TransportFactory,
    state: RwLock<ConnectionState>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    /// Pending-request table: every sent request has exactly one entry until
    /// its response arrives, its timeout elapses, or the transport closes.
    pending: DashMap<u64, oneshot::Sender<Message>>,
    next_id: AtomicU64,
    /// Bumped on every (re)established connection so stale heartbeat loops
    /// notice they have been superseded.
    epoch: AtomicU64,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ClientInner {
    fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Marks the connection lost and cancels every outstanding waiter.
    fn mark_disconnected(&self) {
        self.set_state(ConnectionState::Disconnected);
        self.pending.clear();
    }
}

/// Persistent, self-healing client for one tool server.
pub struct ToolClient {
    inner: Arc<ClientInner>,
}

impl ToolClient {
    pub fn new(factory: TransportFactory, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                factory,
                state: RwLock::new(ConnectionState::Disconnected),
                transport: RwLock::new(None),
                pending: DashMap::new(),
                next_id: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Establishes the first connection, runs `initialize`, and on success
    /// spawns the receive, heartbeat and reconnect loops.
    pub async fn connect(&self) -> Result<(), WireError> {
        establish(&self.inner).await?;
        spawn_connection_loops(&self.inner);
        let handle = tokio::spawn(reconnect_loop(self.inner.clone()));
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
        info!(client = %self.inner.config.client_name, "connected");
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state() == ConnectionState::Connected
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Re-runs the `initialize` handshake on the current connection and
    /// returns the server's advertisement.
    pub async fn initialize(&self) -> Result<Value, WireError> {
        let reply = send_request(
            &self.inner,
            method::INITIALIZE,
            Some(initialize_params(&self.inner.config)),
            Duration::from_secs(10),
        )
        .await?;
        Ok(reply.result.unwrap_or(Value::Null))
    }

    /// Fetches the server's tool catalog.
    pub async fn list_tools(&self) -> Result<Vec<ToolSpec>, WireError> {
        let reply = send_request(
            &self.inner,
            method::TOOLS_LIST,
            None,
            self.inner.config.request_timeout,
        )
        .await?;
        let tools = reply
            .result
            .as_ref()
            .and_then(|r| r.get("tools"))
            .cloned()
            .unwrap_or(json!([]));
        serde_json::from_value(tools)
            .map_err(|e| WireError::internal(format!("tools/list result: {}", e)))
    }

    /// Calls a tool with the default request timeout.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, WireError> {
        self.call_tool_with_timeout(name, arguments, self.inner.config.request_timeout)
            .await
    }

    /// Calls a tool with a caller-supplied deadline. Any outcome (response,
    /// timeout, transport error) clears the pending entry.
    pub async fn call_tool_with_timeout(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<Value, WireError> {
        let params = json!({ "name": name, "arguments": arguments });
        let reply = send_request(&self.inner, method::TOOLS_CALL, Some(params), timeout).await?;
        Ok(reply.result.unwrap_or(Value::Null))
    }

    /// Sends one ping and awaits the pong.
    pub async fn ping(&self) -> Result<(), WireError> {
        send_request(
            &self.inner,
            method::PING,
            None,
            self.inner.config.heartbeat_wait,
        )
        .await
        .map(|_| ())
    }

    /// Cancels the background tasks (bounded join), cancels every
    /// outstanding waiter and closes the transport.
    pub async fn close(&self) {
        info!(client = %self.inner.config.client_name, "closing");
        self.inner.cancel.cancel();
        self.inner.set_state(ConnectionState::Disconnected);

        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            tasks.drain(..).collect()
        };
        for mut handle in handles {
            if tokio::time::timeout(Duration::from_secs(5), &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }

        self.inner.pending.clear();
        let transport = self
            .inner
            .transport
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(t) = transport {
            let _ = t.close().await;
        }
    }
}

fn initialize_params(config: &ClientConfig) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": {}, "resources": {}, "prompts": {} },
        "clientInfo": { "name": config.client_name, "version": config.client_version },
    })
}

/// Dials the factory and runs the `initialize` handshake. On success the
/// client is `Connected` and the connection epoch is bumped.
async fn establish(inner: &Arc<ClientInner>) -> Result<(), WireError> {
    inner.set_state(ConnectionState::Connecting);
    let transport = match (inner.factory)().await {
        Ok(t) => t,
        Err(e) => {
            inner.set_state(ConnectionState::Disconnected);
            return Err(e);
        }
    };
    *inner
        .transport
        .write()
        .unwrap_or_else(|e| e.into_inner()) = Some(transport);
    inner.set_state(ConnectionState::Connected);
    inner.epoch.fetch_add(1, Ordering::SeqCst);

    match send_request(
        inner,
        method::INITIALIZE,
        Some(initialize_params(&inner.config)),
        Duration::from_secs(10),
    )
    .await
    {
        Ok(_) => Ok(()),
        Err(e) => {
            inner.mark_disconnected();
            let stale = inner
                .transport
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some(t) = stale {
                let _ = t.close().await;
            }
            Err(e)
        }
    }
}

/// Spawns the receive and heartbeat loops for the current transport.
fn spawn_connection_loops(inner: &Arc<ClientInner>) {
    let transport = match inner.transport() {
        Some(t) => t,
        None => return,
    };
    let mut handles = Vec::with_capacity(2);
    if transport.bidirectional() {
        handles.push(tokio::spawn(receive_loop(inner.clone(), transport)));
    }
    handles.push(tokio::spawn(heartbeat_loop(inner.clone())));
    inner
        .tasks
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .extend(handles);
}

/// Allocates the next correlation id, registers a waiter, sends the frame
/// and awaits the response within `timeout`. Every outcome removes the
/// pending entry. A response carrying `error` becomes `WireError::Rpc`.
async fn send_request(
    inner: &Arc<ClientInner>,
    method_name: &str,
    params: Option<Value>,
    timeout: Duration,
) -> Result<Message, WireError> {
    if inner.state() != ConnectionState::Connected {
        return Err(WireError::connection_lost("not connected"));
    }
    let transport = inner
        .transport()
        .ok_or_else(|| WireError::connection_lost("not connected"))?;
    let id = inner.next_id();
    let request = Message::request(id, method_name, params);

    if !transport.bidirectional() {
        // Synchronous mode for request/response transports.
        let reply = tokio::time::timeout(timeout, transport.round_trip(&request))
            .await
            .map_err(|_| WireError::Timeout(timeout))??;
        return into_result(reply);
    }

    let (tx, rx) = oneshot::channel();
    inner.pending.insert(id, tx);

    if let Err(e) = transport.send(&request).await {
        inner.pending.remove(&id);
        if e.is_connection_lost() {
            inner.mark_disconnected();
        }
        return Err(e);
    }

    let outcome = match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(reply)) => into_result(reply),
        // The waiter was dropped: transport lost or client closing.
        Ok(Err(_)) => Err(WireError::connection_lost(
            "connection lost while awaiting response",
        )),
        Err(_) => Err(WireError::Timeout(timeout)),
    };
    inner.pending.remove(&id);
    outcome
}

fn into_result(reply: Message) -> Result<Message, WireError> {
    match reply.error {
        Some(obj) => Err(WireError::Rpc(obj)),
        None => Ok(reply),
    }
}

/// Routes one incoming frame: responses complete their waiter; anything
/// else is logged and dropped.
fn route_message(inner: &ClientInner, message: Message) {
    if let Some(id) = message.id.as_ref().and_then(MessageId::as_u64) {
        if let Some((_, tx)) = inner.pending.remove(&id) {
            let _ = tx.send(message);
            return;
        }
    }
    match &message.method {
        Some(m) => debug!(method = %m, "server-initiated message"),
        None => warn!(id = ?message.id, "response without matching request"),
    }
}

async fn receive_loop(inner: Arc<ClientInner>, transport: Arc<dyn Transport>) {
    debug!("receive loop started");
    let mut consecutive_errors = 0u32;
    loop {
        let received = tokio::select! {
            _ = inner.cancel.cancelled() => break,
            r = transport.receive() => r,
        };
        match received {
            Ok(message) => {
                consecutive_errors = 0;
                route_message(&inner, message);
            }
            Err(e) if e.is_connection_lost() => {
                warn!("connection lost in receive loop");
                inner.mark_disconnected();
                break;
            }
            Err(e) => {
                consecutive_errors += 1;
                error!(error = %e, consecutive_errors, "receive error");
                if consecutive_errors >= inner.config.max_receive_errors {
                    error!("too many consecutive receive errors, disconnecting");
                    inner.mark_disconnected();
                    break;
                }
                tokio::select! {
                    _ = inner.cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            }
        }
    }
    debug!("receive loop stopped");
}

async fn heartbeat_loop(inner: Arc<ClientInner>) {
    debug!("heartbeat loop started");
    let epoch = inner.epoch.load(Ordering::SeqCst);
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = tokio::time::sleep(inner.config.heartbeat_interval) => {}
        }
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            break; // superseded by a reconnect
        }
        if inner.state() != ConnectionState::Connected {
            break;
        }
        match send_request(&inner, method::PING, None, inner.config.heartbeat_wait).await {
            Ok(_) => debug!("heartbeat pong"),
            Err(WireError::Timeout(_)) => {
                warn!("heartbeat ping timed out, connection may be unstable")
            }
            Err(e) => {
                error!(error = %e, "heartbeat failed, disconnecting");
                inner.mark_disconnected();
                break;
            }
        }
    }
    debug!("heartbeat loop stopped");
}

async fn reconnect_loop(inner: Arc<ClientInner>) {
    let mut attempts = 0u32;
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = tokio::time::sleep(inner.config.poll_interval) => {}
        }
        if inner.state() != ConnectionState::Disconnected {
            attempts = 0;
            continue;
        }
        if attempts >= inner.config.max_reconnect_attempts {
            error!(
                attempts,
                "max reconnect attempts reached, giving up"
            );
            break;
        }
        attempts += 1;
        info!(
            attempt = attempts,
            max = inner.config.max_reconnect_attempts,
            "attempting reconnection"
        );
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = tokio::time::sleep(inner.config.reconnect_delay) => {}
        }
        match establish(&inner).await {
            Ok(()) => {
                spawn_connection_loops(&inner);
                attempts = 0;
                info!("reconnection successful");
            }
            Err(e) => {
                warn!(attempt = attempts, error = %e, "reconnection attempt failed");
            }
        }
    }
}
