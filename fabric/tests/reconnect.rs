//! Reconnection behavior: transparent recovery after a lost transport,
//! give-up after max attempts, waiter cancellation on transport loss.


use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fabric::{
    channel_pair, factory_fn, handler_fn, ClientConfig, ConnectionState, Tool, ToolClient,
    ToolServer, Transport, WireError,
};
use serde_json::{json, Value};

fn quick_config(max_reconnect_attempts: u32) -> ClientConfig {
    ClientConfig {
        request_timeout: Duration::from_secs(5),
        heartbeat_interval: Duration::from_secs(60),
        reconnect_delay: Duration::from_millis(20),
        poll_interval: Duration::from_millis(20),
        max_reconnect_attempts,
        ..ClientConfig::default()
    }
}

fn echo_server() -> ToolServer {
    let mut server = ToolServer::new("reconnect-test", "0.1.0");
    server.add_tool(Tool::new(
        "echo",
        "Echoes the text argument",
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        }),
        handler_fn(|args| async move {
            Ok(Value::String(
                args["text"].as_str().unwrap_or_default().to_string(),
            ))
        }),
    ));
    server
}

fn queued_factory(transports: Vec<Arc<dyn Transport>>) -> fabric::TransportFactory {
    let queue = Arc::new(Mutex::new(VecDeque::from(transports)));
    factory_fn(move || {
        let queue = queue.clone();
        async move {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| WireError::connection_lost("dial failed"))
        }
    })
}

async fn wait_for_state(client: &ToolClient, wanted: ConnectionState) {
    for _ in 0..200 {
        if client.state() == wanted {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("client never reached {:?}", wanted);
}

#[tokio::test]
async fn reconnect_restores_call_semantics() {
    let (local_a, remote_a) = channel_pair();
    let (local_b, remote_b) = channel_pair();
    let server_side_a: Arc<dyn Transport> = Arc::new(remote_a);

    let first = echo_server();
    let first_transport = server_side_a.clone();
    tokio::spawn(async move { first.serve(first_transport).await });
    let second = echo_server();
    tokio::spawn(async move { second.serve(Arc::new(remote_b)).await });

    let client = ToolClient::new(
        queued_factory(vec![Arc::new(local_a), Arc::new(local_b)]),
        quick_config(3),
    );
    client.connect().await.unwrap();

    let result = client
        .call_tool("echo", json!({"text": "before"}))
        .await
        .unwrap();
    assert_eq!(fabric::first_text(&result), Some("before"));

    // Kill the first connection from the server side.
    server_side_a.close().await.unwrap();
    wait_for_state(&client, ConnectionState::Disconnected).await;

    // The reconnect loop dials the factory again and re-initializes.
    wait_for_state(&client, ConnectionState::Connected).await;

    let result = client
        .call_tool("echo", json!({"text": "after"}))
        .await
        .unwrap();
    assert_eq!(fabric::first_text(&result), Some("after"));
    assert_eq!(client.pending_requests(), 0);

    client.close().await;
}

#[tokio::test]
async fn gives_up_after_max_attempts_and_stays_disconnected() {
    let (local, remote) = channel_pair();
    let server_side: Arc<dyn Transport> = Arc::new(remote);

    let server = echo_server();
    let serve_transport = server_side.clone();
    tokio::spawn(async move { server.serve(serve_transport).await });

    // Only one transport in the queue: every reconnection attempt fails.
    let client = ToolClient::new(queued_factory(vec![Arc::new(local)]), quick_config(2));
    client.connect().await.unwrap();

    server_side.close().await.unwrap();
    wait_for_state(&client, ConnectionState::Disconnected).await;

    // Give the reconnect loop time to exhaust both attempts.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let err = client.call_tool("echo", json!({"text": "x"})).await.unwrap_err();
    assert!(err.is_connection_lost());

    client.close().await;
}

#[tokio::test]
async fn transport_loss_cancels_outstanding_waiters() {
    let (local, remote) = channel_pair();
    let server_side: Arc<dyn Transport> = Arc::new(remote);

    // No server behind the transport: requests just sit in the table.
    let client = Arc::new(ToolClient::new(
        queued_factory(vec![Arc::new(local)]),
        quick_config(0),
    ));
    // Connect would block on initialize with nobody answering, so answer
    // the handshake by hand, then stop serving.
    let handshake = tokio::spawn({
        let server_side = server_side.clone();
        async move {
            let msg = server_side.receive().await.unwrap();
            let reply = fabric::Message::response(msg.id.unwrap(), json!({}));
            server_side.send(&reply).await.unwrap();
        }
    });
    client.connect().await.unwrap();
    handshake.await.unwrap();

    let inflight = tokio::spawn({
        let client = client.clone();
        async move { client.call_tool("echo", json!({"text": "never"})).await }
    });
    // Let the request land in the pending table, then cut the connection.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.pending_requests(), 1);
    server_side.close().await.unwrap();

    let err = inflight.await.unwrap().unwrap_err();
    assert!(err.is_connection_lost());
    assert_eq!(client.pending_requests(), 0);

    client.close().await;
}
