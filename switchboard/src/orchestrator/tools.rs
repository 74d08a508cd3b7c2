//! The orchestrator's own tool catalog, so other hosts can drive it over
//! the same tool-RPC dialect it uses for its services.

use std::sync::Arc;

use fabric::{handler_fn, Tool, ToolServer, WireError};
use serde_json::json;

use crate::context::InterfaceKind;
use crate::orchestrator::{CommandRequest, Orchestrator};

/// Builds a tool server exposing `process_command`, `analyze_intent`,
/// `create_session` and `service_analytics`. One instance per connection;
/// the handlers share the orchestrator.
pub fn orchestrator_tool_server(orchestrator: &Arc<Orchestrator>) -> ToolServer {
    let mut server = ToolServer::new("switchboard-core", env!("CARGO_PKG_VERSION"));

    let orch = orchestrator.clone();
    server.add_tool(Tool::new(
        "process_command",
        "Process a natural language command with context awareness",
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "The command text to process" },
                "session_id": { "type": "string", "description": "Session id for context" },
                "user_id": { "type": "string", "description": "User id for personalization" },
                "interface_type": {
                    "type": "string",
                    "enum": ["voice", "text", "web", "mobile"],
                    "default": "voice"
                },
                "context": {
                    "type": "object",
                    "description": "Additional context (e.g. location)"
                }
            },
            "required": ["text"]
        }),
        handler_fn(move |args| {
            let orch = orch.clone();
            async move {
                let request: CommandRequest = serde_json::from_value(args)
                    .map_err(|e| WireError::invalid_params(e.to_string()))?;
                let response = orch.process_command(request).await;
                serde_json::to_value(response)
                    .map_err(|e| WireError::internal(e.to_string()))
            }
        }),
    ));

    let orch = orchestrator.clone();
    server.add_tool(Tool::new(
        "analyze_intent",
        "Classify a command without dispatching it",
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" },
                "session_id": { "type": "string" }
            },
            "required": ["text"]
        }),
        handler_fn(move |args| {
            let orch = orch.clone();
            async move {
                let text = args["text"].as_str().unwrap_or_default().to_string();
                let session_id = args["session_id"].as_str().map(str::to_string);
                let result = orch.analyze(&text, session_id.as_deref());
                serde_json::to_value(result)
                    .map_err(|e| WireError::internal(e.to_string()))
            }
        }),
    ));

    let orch = orchestrator.clone();
    server.add_tool(Tool::new(
        "create_session",
        "Create a new user session",
        json!({
            "type": "object",
            "properties": {
                "user_id": { "type": "string" },
                "interface_type": {
                    "type": "string",
                    "enum": ["voice", "text", "web", "mobile"]
                }
            },
            "required": ["user_id", "interface_type"]
        }),
        handler_fn(move |args| {
            let orch = orch.clone();
            async move {
                let user_id = args["user_id"].as_str().unwrap_or_default().to_string();
                let interface: InterfaceKind =
                    serde_json::from_value(args["interface_type"].clone())
                        .map_err(|e| WireError::invalid_params(e.to_string()))?;
                let session_id = orch.create_session(&user_id, interface);
                Ok(json!({
                    "session_id": session_id,
                    "user_id": user_id,
                    "interface_type": interface,
                    "created_at": chrono::Utc::now(),
                }))
            }
        }),
    ));

    let orch = orchestrator.clone();
    server.add_tool(Tool::new(
        "service_analytics",
        "Per-service performance analytics",
        json!({
            "type": "object",
            "properties": {
                "service_name": { "type": "string" },
                "metric": {
                    "type": "string",
                    "enum": ["response_time", "error_rate", "usage"],
                    "default": "response_time"
                }
            }
        }),
        handler_fn(move |args| {
            let orch = orch.clone();
            async move {
                let service = args["service_name"].as_str().map(str::to_string);
                let metric = args["metric"].as_str().unwrap_or("response_time").to_string();
                let analytics = orch.analytics(service.as_deref());
                serde_json::to_value(json!({ "analytics": analytics, "metric": metric }))
                    .map_err(|e| WireError::internal(e.to_string()))
            }
        }),
    ));

    server
}
