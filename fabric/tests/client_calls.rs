//! Integration tests for ToolClient over the in-memory channel transport:
//! auto-initialize, concurrent multiplexing, timeout cleanup, error
//! translation, close semantics.


use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fabric::{
    channel_pair, factory_fn, handler_fn, ClientConfig, ConnectionState, Tool, ToolClient,
    ToolServer, Transport, WireError, CODE_INTERNAL,
};
use serde_json::{json, Value};

fn quick_config() -> ClientConfig {
    ClientConfig {
        request_timeout: Duration::from_secs(5),
        heartbeat_interval: Duration::from_secs(60),
        reconnect_delay: Duration::from_millis(20),
        poll_interval: Duration::from_millis(20),
        ..ClientConfig::default()
    }
}

fn test_server() -> ToolServer {
    let mut server = ToolServer::new("client-test", "0.1.0");
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
    server.add_tool(Tool::new(
        "slow",
        "Sleeps longer than any caller deadline",
        json!({ "type": "object", "properties": {} }),
        handler_fn(|_args| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(json!("done"))
        }),
    ));
    server.add_tool(Tool::new(
        "fail",
        "Always fails",
        json!({ "type": "object", "properties": {} }),
        handler_fn(|_args| async move {
            Err::<Value, _>(WireError::internal("handler exploded"))
        }),
    ));
    server
}

/// Factory handing out pre-connected transports, one per connection
/// attempt; fails once the queue runs dry.
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

/// Spawns a fresh server serving the given transport.
fn spawn_server(transport: Arc<dyn Transport>) {
    let server = test_server();
    tokio::spawn(async move { server.serve(transport).await });
}

#[tokio::test]
async fn connect_initializes_and_calls_tools() {
    let (local, remote) = channel_pair();
    spawn_server(Arc::new(remote));

    let client = ToolClient::new(queued_factory(vec![Arc::new(local)]), quick_config());
    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 3);

    let result = client
        .call_tool("echo", json!({"text": "hello"}))
        .await
        .unwrap();
    assert_eq!(fabric::first_text(&result), Some("hello"));

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn concurrent_calls_demultiplex_and_clear_the_table() {
    let (local, remote) = channel_pair();
    spawn_server(Arc::new(remote));

    let client = Arc::new(ToolClient::new(
        queued_factory(vec![Arc::new(local)]),
        quick_config(),
    ));
    client.connect().await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .call_tool("echo", json!({"text": format!("msg-{}", i)}))
                .await
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(
            fabric::first_text(&result),
            Some(format!("msg-{}", i).as_str())
        );
    }
    assert_eq!(client.pending_requests(), 0);

    client.close().await;
}

#[tokio::test]
async fn timeout_surfaces_and_clears_the_pending_entry() {
    let (local, remote) = channel_pair();
    spawn_server(Arc::new(remote));

    let client = ToolClient::new(queued_factory(vec![Arc::new(local)]), quick_config());
    client.connect().await.unwrap();

    let err = client
        .call_tool_with_timeout("slow", json!({}), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, WireError::Timeout(_)));
    assert_eq!(client.pending_requests(), 0);

    client.close().await;
}

#[tokio::test]
async fn server_errors_are_translated_preserving_the_code() {
    let (local, remote) = channel_pair();
    spawn_server(Arc::new(remote));

    let client = ToolClient::new(queued_factory(vec![Arc::new(local)]), quick_config());
    client.connect().await.unwrap();

    let err = client.call_tool("fail", json!({})).await.unwrap_err();
    assert_eq!(err.code(), CODE_INTERNAL);
    assert!(err.to_string().contains("handler exploded"));

    client.close().await;
}

#[tokio::test]
async fn submissions_while_disconnected_fail_immediately() {
    let client = ToolClient::new(queued_factory(vec![]), quick_config());
    let err = client.call_tool("echo", json!({})).await.unwrap_err();
    assert!(err.is_connection_lost());
    assert!(err.to_string().contains("not connected"));
    assert_eq!(client.pending_requests(), 0);
}
